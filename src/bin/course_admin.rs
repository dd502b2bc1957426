use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use course_certify::{
    analysis::batch::{BatchProcessor, status_summary},
    analytics::course_analytics,
    certificate::{
        CertificateIssuer,
        artifact::{LocalDirUploader, SvgCertificateRenderer},
    },
    config::Config,
    course, progress,
    server::{build_pipeline, connect_database},
    utils::init_log,
};
use serde::Serialize;

#[derive(Debug, clap::Parser)]
struct Args {
    #[command(subcommand)]
    command: Commands,
    /// Path to the toml config file
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Database url, overrides the config file
    #[arg(short, long)]
    database: Option<String>,
}

#[derive(Debug, clap::Subcommand)]
enum Commands {
    User {
        #[command(subcommand)]
        command: UserCommand,
    },
    Course {
        #[command(subcommand)]
        command: CourseCommand,
    },
    /// Record that a user watched a video to the end
    Watch {
        #[arg(short, long)]
        user: i64,
        #[arg(short, long)]
        video: i64,
    },
    Eligibility {
        #[arg(short, long)]
        user: i64,
        #[arg(short, long)]
        course: i64,
    },
    Issue {
        #[arg(short, long)]
        user: i64,
        #[arg(short, long)]
        course: i64,
    },
}

#[derive(Debug, clap::Subcommand)]
enum UserCommand {
    Create {
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        email: String,
    },
}

#[derive(Debug, clap::Subcommand)]
enum CourseCommand {
    Create {
        #[arg(short, long)]
        creator: i64,
        #[arg(short, long)]
        title: String,
    },
    AddVideo {
        course: i64,
        /// Id on the hosting platform
        #[arg(short, long)]
        external_id: String,
        #[arg(short, long)]
        title: String,
        #[arg(long, default_value = "0")]
        duration: i64,
    },
    Videos { course: i64 },
    /// Analyze every pending video of the course
    Analyze { course: i64 },
    Status { course: i64 },
    Analytics {
        course: i64,
        #[arg(short, long)]
        creator: i64,
    },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    if let Err(e) = run(args).await {
        eprintln!("{:?}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let _guard = init_log(None)?;
    let mut config = Config::read(args.config.as_deref())?;
    if let Some(database) = args.database {
        config.database_url = database;
    }
    let database = connect_database(&config.database_url).await?;

    match args.command {
        Commands::User { command } => match command {
            UserCommand::Create { name, email } => {
                let id = course::create_user(&database, &name, &email).await?;
                println!("User created with id: {}", id);
            }
        },
        Commands::Course { command } => match command {
            CourseCommand::Create { creator, title } => {
                let id = course::create_course(&database, creator, &title).await?;
                println!("Course created with id: {}", id);
            }
            CourseCommand::AddVideo {
                course: course_id,
                external_id,
                title,
                duration,
            } => {
                let id = course::add_video(&database, course_id, &external_id, &title, duration).await?;
                println!("Video added with id: {}", id);
            }
            CourseCommand::Videos { course: course_id } => {
                for video in course::list_videos(&database, course_id).await? {
                    println!(
                        "{:<8} {:<14} {:<10} {:<6} {}",
                        video.id,
                        video.external_id,
                        format!("{:?}", video.analysis_status),
                        video.has_quiz,
                        video.title
                    );
                }
            }
            CourseCommand::Analyze { course: course_id } => {
                config.validate()?;
                let pipeline = Arc::new(build_pipeline(&config)?);
                let processor =
                    BatchProcessor::new(database.clone(), pipeline, config.analysis.max_concurrency);
                print_json(&processor.process_pending(course_id).await?)?;
            }
            CourseCommand::Status { course: course_id } => {
                print_json(&status_summary(&database, course_id).await?)?;
            }
            CourseCommand::Analytics {
                course: course_id,
                creator,
            } => {
                print_json(&course_analytics(&database, creator, course_id).await?)?;
            }
        },
        Commands::Watch { user, video } => {
            print_json(&progress::complete_video(&database, user, video).await?)?;
        }
        Commands::Eligibility { user, course } => {
            let issuer = issuer(&config, database);
            print_json(&issuer.eligibility().evaluate(user, course).await?)?;
        }
        Commands::Issue { user, course } => {
            let issuer = issuer(&config, database);
            let certificate = issuer.issue(user, course).await?;
            println!("Certificate {} issued: {}", certificate.id, certificate.artifact_url);
        }
    }
    Ok(())
}

fn issuer(config: &Config, database: sqlx::SqlitePool) -> CertificateIssuer {
    CertificateIssuer::new(
        database,
        Arc::new(SvgCertificateRenderer::new(&config.certificate.presented_by)),
        Arc::new(LocalDirUploader::new(
            &config.certificate.output_dir,
            &config.certificate.public_base_url,
        )),
        config.certificate.render_timeout(),
        config.certificate.upload_timeout(),
    )
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
