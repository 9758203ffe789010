use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Result};
use client_core::{
    format_clock, ApiClient, CertificateAction, Notice, ResultView, SessionController,
    SessionError, Settings, TestBackend,
};
use shared::{
    cin::Cin,
    domain::{Answer, Language, TestVersion, VersionId},
};
use storage::ClientPrefs;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{info, warn};

type Input = Lines<BufReader<Stdin>>;

const HELP: &str = "commands: o/oui/y = yes, n/non = no, > next, < previous, goto N, \
                    status, submit, quit";

pub async fn run(
    api: &ApiClient,
    prefs: &ClientPrefs,
    settings: &Settings,
    version: Option<VersionId>,
    cin: Option<String>,
) -> Result<()> {
    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let language = settings.language;

    let version_id = match version {
        Some(version_id) => version_id,
        None => choose_version(api, prefs, &mut input).await?,
    };
    prefs.select_version(version_id).await?;

    let mut cin = match cin {
        Some(raw) => Some(Cin::parse(&raw)?),
        None => prefs.remembered_cin().await?,
    };

    let backend: Arc<dyn TestBackend> = Arc::new(api.clone());
    let mut controller = SessionController::new(backend, settings.session_settings());

    loop {
        let current_cin = match cin.take() {
            Some(cin) => cin,
            None => match prompt_cin(&mut input).await? {
                Some(cin) => cin,
                None => return Ok(()),
            },
        };
        prefs.remember_cin(&current_cin).await?;

        if let Err(err) = controller.start(version_id, current_cin.clone()).await {
            eprintln!("{}", Notice::from(&err));
            if !confirm(&mut input, "Retry loading the test? [o/n] ").await? {
                return Ok(());
            }
            cin = Some(current_cin);
            continue;
        }
        println!(
            "Test started: {} questions, {} to answer. {HELP}",
            controller.session().map_or(0, |session| session.len()),
            format_clock(settings.test_duration_seconds)
        );

        if !answer_loop(&mut controller, &mut input, language).await? {
            controller.abandon();
            println!("Attempt abandoned.");
            return Ok(());
        }

        match controller.fetch_result().await {
            Ok(view) => {
                print_result(&view);
                offer_certificate(api, &view, &mut input).await?;
            }
            Err(err) => eprintln!("{}", Notice::from(&err)),
        }

        if !confirm(&mut input, "Start another attempt with the same CIN? [o/n] ").await? {
            return Ok(());
        }
        cin = prefs.remembered_cin().await?;
    }
}

/// Runs until the attempt is submitted (`true`) or the candidate quits (`false`).
async fn answer_loop(
    controller: &mut SessionController,
    input: &mut Input,
    language: Language,
) -> Result<bool> {
    show_question(controller, language);
    loop {
        tokio::select! {
            expired = controller.expired() => {
                match controller.handle_timer_expired(expired).await {
                    Ok(Some(completed)) => {
                        println!("\nTime is up. Your answers were submitted.");
                        info!(answered = completed.answered_count, "kiosk: attempt submitted on expiry");
                        return Ok(true);
                    }
                    Ok(None) => {}
                    Err(err) => eprintln!(
                        "\nTime is up. {}  Type 'submit' to retry.",
                        Notice::from(&err)
                    ),
                }
            }
            line = input.next_line() => {
                let Some(line) = line? else {
                    return Ok(false);
                };
                match handle_command(controller, line.trim(), language).await {
                    Ok(CommandOutcome::Continue) => {}
                    Ok(CommandOutcome::Submitted) => return Ok(true),
                    Ok(CommandOutcome::Quit) => return Ok(false),
                    Err(err) => {
                        eprintln!("{}", Notice::from(&err));
                        if let SessionError::IncompleteAnswers { .. } = err {
                            print_unanswered(controller);
                        }
                    }
                }
            }
        }
    }
}

enum CommandOutcome {
    Continue,
    Submitted,
    Quit,
}

async fn handle_command(
    controller: &mut SessionController,
    command: &str,
    language: Language,
) -> Result<CommandOutcome, SessionError> {
    match command {
        "" => {}
        ">" | "next" => {
            controller.go_next()?;
            show_question(controller, language);
        }
        "<" | "prev" | "previous" => {
            controller.go_previous()?;
            show_question(controller, language);
        }
        "status" => print_status(controller),
        "help" | "?" => println!("{HELP}"),
        "submit" => {
            controller.submit().await?;
            println!("Answers submitted.");
            return Ok(CommandOutcome::Submitted);
        }
        "quit" | "q" => return Ok(CommandOutcome::Quit),
        other => {
            if let Some(index) = other.strip_prefix("goto ") {
                match index.trim().parse::<usize>() {
                    Ok(number) if number > 0 => {
                        controller.go_to(number - 1)?;
                        show_question(controller, language);
                    }
                    _ => println!("usage: goto N (1-based)"),
                }
            } else if let Ok(answer) = other.parse::<Answer>() {
                let before = position(controller);
                controller.answer_current(answer)?;
                if controller.go_next()? == before {
                    print_status(controller);
                    println!("Last question answered. Type 'submit' when ready.");
                } else {
                    show_question(controller, language);
                }
            } else {
                println!("{HELP}");
            }
        }
    }
    Ok(CommandOutcome::Continue)
}

fn position(controller: &SessionController) -> usize {
    controller.session().map_or(0, |session| session.position())
}

fn show_question(controller: &SessionController, language: Language) {
    let Some(session) = controller.session() else {
        return;
    };
    let question = session.current();
    let answered = session
        .answer_for(question.id)
        .map(|answer| format!(" [{}]", answer.label(language)))
        .unwrap_or_default();
    println!(
        "\n[{}] Question {}/{}{}{}",
        format_clock(controller.remaining_seconds().unwrap_or(0)),
        session.position() + 1,
        session.len(),
        if question.is_mandatory() { " *" } else { "" },
        answered
    );
    println!("{}", question.text(language));
    if let Some(image) = &question.image {
        println!("(image: {image})");
    }
}

fn print_status(controller: &SessionController) {
    if let Some(session) = controller.session() {
        println!(
            "{}/{} answered ({}%), {} left",
            session.answered_count(),
            session.len(),
            session.progress_percent(),
            format_clock(controller.remaining_seconds().unwrap_or(0))
        );
    }
}

fn print_unanswered(controller: &SessionController) {
    if let Some(session) = controller.session() {
        let missing: Vec<String> = session
            .unanswered()
            .into_iter()
            .map(|index| (index + 1).to_string())
            .collect();
        println!("Unanswered: {}", missing.join(", "));
    }
}

pub fn print_result(view: &ResultView) {
    println!("Score: {}", view.score_label());
    if let Some(version) = view.result().test_version {
        println!("Version: {version}");
    }
    if view.meets_threshold() {
        println!("Passed.");
    } else {
        println!("Below the pass mark.");
    }
    match view.certificate_action() {
        Some(CertificateAction::Download(id)) => println!("Certificate available: {id}"),
        Some(CertificateAction::Generate(_)) => println!("A certificate can be generated."),
        None => {}
    }
}

async fn offer_certificate(api: &ApiClient, view: &ResultView, input: &mut Input) -> Result<()> {
    let certificate_id = match view.certificate_action() {
        Some(CertificateAction::Download(id)) => id,
        Some(CertificateAction::Generate(attempt_id)) => {
            if !confirm(input, "Generate the certificate now? [o/n] ").await? {
                return Ok(());
            }
            match api.generate_certificate(attempt_id).await {
                Ok(certificate) => {
                    println!("Certificate {} issued.", certificate.certificate_number);
                    certificate.id
                }
                Err(err) => {
                    warn!(error = %err, attempt_id = attempt_id.0, "kiosk: certificate generation failed");
                    eprintln!("{}", Notice::from(&err));
                    return Ok(());
                }
            }
        }
        None => return Ok(()),
    };

    if confirm(input, "Save the certificate PDF? [o/n] ").await? {
        let out = PathBuf::from(format!("certificate-{certificate_id}.pdf"));
        if let Err(err) = crate::download(api, certificate_id, &out).await {
            eprintln!("{err:#}");
        }
    }
    Ok(())
}

async fn choose_version(
    api: &ApiClient,
    prefs: &ClientPrefs,
    input: &mut Input,
) -> Result<VersionId> {
    let versions = api.active_versions().await?;
    if let Some(selected) = prefs.selected_version().await? {
        if versions.iter().any(|version| version.id == selected) {
            return Ok(selected);
        }
    }
    match versions.as_slice() {
        [] => bail!("no active test version is available"),
        [only] => Ok(only.id),
        _ => pick_version(&versions, input).await,
    }
}

async fn pick_version(versions: &[TestVersion], input: &mut Input) -> Result<VersionId> {
    for (index, version) in versions.iter().enumerate() {
        println!("{}. {}", index + 1, version.display_name());
    }
    loop {
        let Some(line) = prompt(input, "Choose a test version: ").await? else {
            bail!("no version selected");
        };
        match line.trim().parse::<usize>() {
            Ok(number) if (1..=versions.len()).contains(&number) => {
                return Ok(versions[number - 1].id)
            }
            _ => println!("Enter a number between 1 and {}.", versions.len()),
        }
    }
}

async fn prompt_cin(input: &mut Input) -> Result<Option<Cin>> {
    loop {
        let Some(line) = prompt(input, "CIN: ").await? else {
            return Ok(None);
        };
        match Cin::parse(&line) {
            Ok(cin) => return Ok(Some(cin)),
            Err(err) => println!("{err}"),
        }
    }
}

async fn confirm(input: &mut Input, question: &str) -> Result<bool> {
    loop {
        let Some(line) = prompt(input, question).await? else {
            return Ok(false);
        };
        match line.trim().parse::<Answer>() {
            Ok(answer) => return Ok(answer.as_bool()),
            Err(err) => println!("{err}"),
        }
    }
}

async fn prompt(input: &mut Input, label: &str) -> Result<Option<String>> {
    use std::io::Write;

    print!("{label}");
    std::io::stdout().flush()?;
    Ok(input.next_line().await?)
}
