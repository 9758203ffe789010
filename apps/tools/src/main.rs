use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use client_core::{
    listing::{paginate, render_table, TableRow, DEFAULT_PAGE_SIZE},
    load_settings, ApiClient, AuthSession, ClientError, ImageUpload, Notice, SessionContext,
};
use shared::{
    cin::Cin,
    domain::{Answer, AttemptId, HseUser, HseUserId, Language, QuestionId, VersionId},
    protocol::{HseUserFilters, QuestionDraft, StatsPeriod, VersionDraft},
};
use storage::{ClientPrefs, StoredAuth};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "HSE test administration")]
struct Cli {
    #[arg(long)]
    api_url: Option<String>,
    #[arg(long)]
    database_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in and remember the session locally.
    Login {
        #[arg(long)]
        username: String,
        /// Read from stdin when omitted.
        #[arg(long)]
        password: Option<String>,
    },
    Logout,
    Whoami,
    #[command(subcommand)]
    Versions(VersionCommand),
    #[command(subcommand)]
    Questions(QuestionCommand),
    /// People registered for induction.
    #[command(subcommand)]
    Users(UserCommand),
    /// Attendance and test success percentages.
    Dashboard {
        #[arg(long)]
        day: Option<u32>,
        #[arg(long)]
        month: Option<u32>,
        #[arg(long)]
        year: Option<i32>,
    },
    /// Issue a certificate for a passed attempt.
    GenerateCertificate {
        #[arg(long)]
        attempt: i64,
    },
}

#[derive(Subcommand, Debug)]
enum VersionCommand {
    List {
        /// Include inactive versions.
        #[arg(long)]
        all: bool,
        #[arg(long, default_value_t = 1)]
        page: usize,
    },
    Create(VersionFields),
    Update {
        #[arg(long)]
        id: i64,
        #[command(flatten)]
        fields: VersionFields,
    },
    Delete {
        #[arg(long)]
        id: i64,
    },
    /// Questions of a version, in order.
    Questions {
        #[arg(long)]
        id: i64,
        #[arg(long, default_value_t = 1)]
        page: usize,
    },
    AddQuestion {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        question: i64,
    },
}

#[derive(Args, Debug)]
struct VersionFields {
    #[arg(long)]
    version: Option<i64>,
    #[arg(long)]
    name: Option<String>,
    #[arg(long, default_value = "")]
    description: String,
}

impl From<VersionFields> for VersionDraft {
    fn from(fields: VersionFields) -> Self {
        Self {
            version: fields.version,
            name: fields.name,
            description: fields.description,
        }
    }
}

#[derive(Subcommand, Debug)]
enum QuestionCommand {
    List {
        #[arg(long, default_value_t = 1)]
        page: usize,
    },
    Create(QuestionFields),
    Update {
        #[arg(long)]
        id: i64,
        #[command(flatten)]
        fields: QuestionFields,
    },
    Delete {
        #[arg(long)]
        id: i64,
    },
}

#[derive(Args, Debug)]
struct QuestionFields {
    #[arg(long)]
    code: String,
    #[arg(long)]
    fr: String,
    #[arg(long, default_value = "")]
    en: String,
    #[arg(long, default_value = "")]
    ar: String,
    /// Expected answer (oui/non, yes/no).
    #[arg(long)]
    answer: Answer,
    #[arg(long)]
    mandatory: bool,
    #[arg(long, default_value_t = 1)]
    points: u32,
    #[arg(long)]
    image: Option<PathBuf>,
}

impl QuestionFields {
    fn draft(&self) -> QuestionDraft {
        QuestionDraft {
            question_code: self.code.clone(),
            enonce_fr: self.fr.clone(),
            enonce_en: self.en.clone(),
            enonce_ar: self.ar.clone(),
            expected_answer: self.answer.as_bool(),
            mandatory: self.mandatory,
            points: self.points,
        }
    }
}

#[derive(Subcommand, Debug)]
enum UserCommand {
    List {
        #[arg(long)]
        cin: Option<String>,
        #[arg(long)]
        entity: Option<String>,
        #[arg(long)]
        company: Option<String>,
        /// Only people marked present (oui) or absent (non).
        #[arg(long)]
        present: Option<Answer>,
        #[arg(long)]
        passed: Option<Answer>,
        #[arg(long, default_value_t = 1)]
        page: usize,
    },
    Show {
        #[arg(long)]
        id: i64,
    },
    Search {
        #[arg(long)]
        cin: String,
    },
    /// Mark someone present or absent.
    Presence {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        present: Answer,
    },
    History {
        #[arg(long)]
        id: i64,
        #[arg(long, default_value_t = 1)]
        page: usize,
    },
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    let mut settings = load_settings();
    if let Some(api_url) = cli.api_url {
        settings.api_base_url = api_url;
    }
    if let Some(database_url) = cli.database_url {
        settings.database_url = database_url;
    }

    let prefs = ClientPrefs::open(&settings.database_url)
        .await
        .context("opening local preferences")?;
    let session = match prefs.saved_auth().await? {
        Some(stored) => SessionContext::restored(AuthSession::from(stored)),
        None => SessionContext::new(),
    };
    let api = ApiClient::with_timeout(
        &settings.api_base_url,
        session.clone(),
        settings.request_timeout(),
    )?;

    let outcome = run(cli.command, &api, &prefs, settings.language).await;

    if !session.is_authenticated() && prefs.saved_auth().await?.is_some() {
        prefs.clear_auth().await?;
        info!("tools: stored session discarded");
    }
    if let Err(err) = &outcome {
        if let Some(client_err) = err.downcast_ref::<ClientError>() {
            let notice = Notice::from(client_err);
            eprintln!("{notice}");
            if notice.requires_reauth() {
                eprintln!("Run `tools login --username <name>` first.");
            }
        }
    }
    outcome
}

async fn run(command: Command, api: &ApiClient, prefs: &ClientPrefs, language: Language) -> Result<()> {
    match command {
        Command::Login { username, password } => {
            let password = match password {
                Some(password) => password,
                None => read_password().await?,
            };
            let user = api.login(&username, &password).await?;
            if let Some(session) = api.session().snapshot() {
                prefs.save_auth(&StoredAuth::from(session)).await?;
            }
            println!("Signed in as {} ({}).", user.username, user.role());
        }
        Command::Logout => {
            api.logout().await;
            prefs.clear_auth().await?;
            println!("Signed out.");
        }
        Command::Whoami => {
            let user = api.current_user().await?;
            println!("{} ({})", user.username, user.role());
        }
        Command::Versions(command) => versions(command, api, language).await?,
        Command::Questions(command) => questions(command, api, language).await?,
        Command::Users(command) => users(command, api, language).await?,
        Command::Dashboard { day, month, year } => {
            let stats = api.daily_stats(&StatsPeriod { day, month, year }).await?;
            println!("Presence:      {:.1}%", stats.presence);
            println!("Initial test:  {:.1}%", stats.test_initial);
            println!("Final test:    {:.1}%", stats.test_final);
            println!("Improvement:   {:+.1} pts", stats.improvement());
        }
        Command::GenerateCertificate { attempt } => {
            let certificate = api.generate_certificate(AttemptId(attempt)).await?;
            println!(
                "Certificate {} issued ({}).",
                certificate.certificate_number, certificate.id
            );
        }
    }
    Ok(())
}

async fn versions(command: VersionCommand, api: &ApiClient, language: Language) -> Result<()> {
    match command {
        VersionCommand::List { all, page } => {
            let versions = if all {
                api.list_versions().await?
            } else {
                api.active_versions().await?
            };
            print_page(&versions, page, language);
        }
        VersionCommand::Create(fields) => {
            let created = api.create_version(&fields.into()).await?;
            match created {
                Some(version) => println!("Created version {} ({}).", version.id, version.display_name()),
                None => println!("Version created."),
            }
        }
        VersionCommand::Update { id, fields } => {
            api.update_version(VersionId(id), &fields.into()).await?;
            println!("Updated version {id}.");
        }
        VersionCommand::Delete { id } => {
            api.delete_version(VersionId(id)).await?;
            println!("Deleted version {id}.");
        }
        VersionCommand::Questions { id, page } => {
            let questions = api.version_questions(VersionId(id)).await?;
            print_page(&questions, page, language);
        }
        VersionCommand::AddQuestion { id, question } => {
            let order = api
                .add_question_to_version(VersionId(id), QuestionId(question))
                .await?;
            let order: Vec<String> = order.iter().map(ToString::to_string).collect();
            println!("Question order: {}", order.join(", "));
        }
    }
    Ok(())
}

async fn questions(command: QuestionCommand, api: &ApiClient, language: Language) -> Result<()> {
    match command {
        QuestionCommand::List { page } => {
            let questions = api.list_questions().await?;
            print_page(&questions, page, language);
        }
        QuestionCommand::Create(fields) => {
            let image = load_image(fields.image.as_deref()).await?;
            let question = api.create_question(&fields.draft(), image).await?;
            println!("Created question {}.", question.id);
        }
        QuestionCommand::Update { id, fields } => {
            let image = load_image(fields.image.as_deref()).await?;
            let question = api
                .update_question(QuestionId(id), &fields.draft(), image)
                .await?;
            println!("Updated question {}.", question.id);
        }
        QuestionCommand::Delete { id } => {
            api.delete_question(QuestionId(id)).await?;
            println!("Deleted question {id}.");
        }
    }
    Ok(())
}

async fn users(command: UserCommand, api: &ApiClient, language: Language) -> Result<()> {
    match command {
        UserCommand::List {
            cin,
            entity,
            company,
            present,
            passed,
            page,
        } => {
            let filters = HseUserFilters {
                cin,
                entity,
                company,
                present: present.map(Answer::as_bool),
                passed: passed.map(Answer::as_bool),
            };
            let users = api.list_hse_users(&filters).await?;
            print_page(&users, page, language);
        }
        UserCommand::Show { id } => {
            let user = api.hse_user(HseUserId(id)).await?;
            print_user(&user);
            if !user.recent_attempts.is_empty() {
                println!();
                print_page(&user.recent_attempts, 1, language);
            }
        }
        UserCommand::Search { cin } => {
            let cin = Cin::parse(&cin)?;
            match api.find_hse_user_by_cin(&cin).await? {
                Some(user) => print_user(&user),
                None => println!("Nobody is registered under {cin}."),
            }
        }
        UserCommand::Presence { id, present } => {
            let stored = api.update_presence(HseUserId(id), present.as_bool()).await?;
            let state = if stored { "present" } else { "absent" };
            println!("User {id} marked {state}.");
        }
        UserCommand::History { id, page } => {
            let attempts = api.hse_user_history(HseUserId(id)).await?;
            print_page(&attempts, page, language);
        }
        UserCommand::Stats => {
            let stats = api.hse_statistics().await?;
            println!("Registered:    {}", stats.total_users);
            println!(
                "Present:       {} ({:.1}%)",
                stats.present_users, stats.present_percentage
            );
            println!(
                "Passed:        {} ({:.1}%)",
                stats.successful_users, stats.success_rate
            );
            println!("Average score: {:.2}", stats.average_score);
        }
    }
    Ok(())
}

fn print_user(user: &HseUser) {
    let flag = |value: bool| if value { "yes" } else { "no" };
    println!("{} (#{})", user.display_name(), user.id);
    println!("  CIN:      {}", user.cin);
    if !user.email.is_empty() {
        println!("  Email:    {}", user.email);
    }
    println!("  Entity:   {}", user.entity);
    println!("  Company:  {}", user.company);
    if let Some(lead) = user.project_lead.as_deref().filter(|lead| !lead.is_empty()) {
        println!("  Lead:     {lead}");
    }
    println!("  Present:  {}", flag(user.present));
    println!("  Passed:   {}", flag(user.passed));
    if let Some(score) = user.score {
        println!("  Score:    {score:.1}%");
    }
    if let Some(count) = user.test_attempts_count {
        println!("  Attempts: {count}");
    }
}

fn print_page<T: TableRow>(items: &[T], page: usize, language: Language) {
    print!("{}", render_table(&paginate(items, page, DEFAULT_PAGE_SIZE), language));
}

async fn load_image(path: Option<&Path>) -> Result<Option<ImageUpload>> {
    let Some(path) = path else {
        return Ok(None);
    };
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    let mime_type = mime_guess::from_path(path)
        .first_raw()
        .map(str::to_string);
    Ok(Some(ImageUpload {
        filename,
        mime_type,
        bytes,
    }))
}

async fn read_password() -> Result<String> {
    eprint!("Password: ");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    match lines.next_line().await? {
        Some(line) if !line.is_empty() => Ok(line),
        _ => bail!("no password given"),
    }
}
