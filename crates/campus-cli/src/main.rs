use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "campus",
    about = "Campus — school administration from the terminal",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Path to campus.toml
    #[arg(short, long, global = true, default_value = "campus.toml")]
    config: PathBuf,

    /// Output format: text or json
    #[arg(short, long, global = true, default_value = "text")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default campus.toml
    Init {
        /// Backend base URL
        #[arg(long, default_value = "http://localhost:3000/api")]
        base_url: String,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Store a session token for later commands
    Login {
        #[arg(long)]
        token: String,
        /// User id or a JSON user object
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        role: Option<String>,
    },
    /// Forget the stored session
    Logout,
    /// List a resource collection.
    ///
    /// Resources: enrollments, workers, classrooms, assignments,
    /// evaluations, tasks (backend path names are accepted too).
    List {
        resource: String,
        /// Filter as key=value; repeatable
        #[arg(long = "filter", value_name = "KEY=VALUE")]
        filters: Vec<String>,
    },
    /// Show one record
    Show { resource: String, id: String },
    /// Enroll a student (create, then assign a classroom if given)
    Enroll {
        #[arg(long)]
        student: String,
        #[arg(long)]
        grade: String,
        /// Classroom to assign right away
        #[arg(long)]
        classroom: Option<String>,
        /// Payment voucher to upload first
        #[arg(long)]
        voucher: Option<PathBuf>,
        /// Uploader id (defaults to the logged-in user)
        #[arg(long)]
        user_id: Option<String>,
    },
    /// Assign a classroom to an existing enrollment
    Assign { id: String, classroom: String },
    /// Register an enrollment payment
    Pay {
        id: String,
        #[arg(long)]
        registrar: String,
        /// Receipt number (generated when omitted)
        #[arg(long)]
        receipt: Option<String>,
    },
    /// Create a task, optionally with an attachment
    Task {
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        attachment: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("campus=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output = commands::Output::parse(&cli.format)?;

    match cli.command {
        Commands::Init { base_url, force } => {
            commands::session::init(&cli.config, &base_url, force)
        }
        Commands::Login { token, user, role } => {
            commands::session::login(&cli.config, &token, user.as_deref(), role)
        }
        Commands::Logout => commands::session::logout(&cli.config),
        Commands::List { resource, filters } => {
            commands::browse::list(&cli.config, &resource, &filters, output).await
        }
        Commands::Show { resource, id } => {
            commands::browse::show(&cli.config, &resource, &id, output).await
        }
        Commands::Enroll {
            student,
            grade,
            classroom,
            voucher,
            user_id,
        } => {
            let args = commands::enroll::EnrollArgs {
                student,
                grade,
                classroom,
                voucher,
                user_id,
            };
            commands::enroll::enroll(&cli.config, args, output).await
        }
        Commands::Assign { id, classroom } => {
            commands::enroll::assign(&cli.config, &id, &classroom, output).await
        }
        Commands::Pay {
            id,
            registrar,
            receipt,
        } => commands::enroll::pay(&cli.config, &id, &registrar, receipt.as_deref(), output).await,
        Commands::Task {
            title,
            description,
            attachment,
        } => {
            commands::enroll::task(
                &cli.config,
                &title,
                description.as_deref(),
                attachment.as_deref(),
                output,
            )
            .await
        }
    }
}
