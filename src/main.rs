use std::io::{self, IsTerminal};
use std::process::ExitCode;

use clap::Parser;
use nu_ansi_term::{Color, Style};
use reedline::{
    ColumnarMenu, DefaultHinter, Emacs, FileBackedHistory, KeyCode, KeyModifiers, MenuBuilder,
    Reedline, ReedlineEvent, ReedlineMenu, Signal, default_emacs_keybindings,
};
use tracing::{debug, info};

use dbline::backend::DriverRegistry;
use dbline::cli::{self, Args};
use dbline::completion::ShellCompleter;
use dbline::config::Config;
use dbline::console::Console;
use dbline::database_sqlx;
use dbline::dispatch::Shell;
use dbline::error::ShellError;
use dbline::logging;
use dbline::prompt::ShellPrompt;

const HISTORY_SIZE: usize = 1000;

fn main() -> ExitCode {
    let (raw_args, overrides) = cli::extract_overrides(std::env::args());
    let args = Args::parse_from(raw_args);

    if let Some(shell) = args.completions {
        cli::generate_completions(shell, &mut io::stdout());
        return ExitCode::SUCCESS;
    }

    let config_path = Config::default_path();
    let config = match config_path.as_deref().map(Config::load_from) {
        Some(Ok(config)) => config,
        Some(Err(e)) => {
            eprintln!("{e}");
            Config::default()
        }
        None => Config::default(),
    };

    let _log_guard = match logging::init(&config.logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Warning: Failed to initialize logging: {e}");
            None
        }
    };
    info!("[main] dbline {} started", env!("CARGO_PKG_VERSION"));
    debug!("[main] {:?}", args);

    let mut drivers = DriverRegistry::new();
    database_sqlx::register_builtin(&mut drivers);
    let console = Console::stdout(config.opts.color);
    let mut shell = Shell::new(config.opts.clone(), drivers, console)
        .with_config(config_path, config.logging.clone());

    for (key, value) in overrides {
        if let Err(e) = shell.opts.set(&key, &value) {
            shell.report_error(&e);
        }
    }
    shell.console.color = shell.opts.color;

    if let Some((url, user, password, driver)) = args.connect_parts() {
        let password = if !user.is_empty() && args.password.is_none() && io::stdin().is_terminal() {
            match rpassword::prompt_password(format!("Enter password for {user}: ")) {
                Ok(password) => password,
                Err(e) => {
                    shell.report_error(&ShellError::Io(e));
                    String::new()
                }
            }
        } else {
            password.to_string()
        };
        if let Err(e) = shell.connect_with(url, user, &password, driver) {
            shell.report_error(&e);
        }
        shell.refresh_completions();
    }

    if !args.execute.is_empty() {
        for command in &args.execute {
            if !shell.dispatch(Some(command)) {
                return ExitCode::SUCCESS;
            }
        }
        shell.dispatch(None);
        return ExitCode::SUCCESS;
    }

    run_interactive(&mut shell);
    ExitCode::SUCCESS
}

fn run_interactive(shell: &mut Shell) {
    let completion_menu = Box::new(ColumnarMenu::default().with_name("completion_menu"));

    let mut keybindings = default_emacs_keybindings();
    keybindings.add_binding(
        KeyModifiers::NONE,
        KeyCode::Tab,
        ReedlineEvent::UntilFound(vec![
            ReedlineEvent::Menu("completion_menu".to_string()),
            ReedlineEvent::MenuNext,
        ]),
    );
    keybindings.add_binding(
        KeyModifiers::SHIFT,
        KeyCode::BackTab,
        ReedlineEvent::MenuPrevious,
    );
    let edit_mode = Box::new(Emacs::new(keybindings));

    let hinter =
        Box::new(DefaultHinter::default().with_style(Style::new().italic().fg(Color::LightGray)));

    let history = Box::new(
        FileBackedHistory::with_file(HISTORY_SIZE, shell.opts.history_file.clone())
            .unwrap_or_else(|e| {
                debug!("[main] History unavailable: {}", e);
                FileBackedHistory::default()
            }),
    );

    let completer = Box::new(ShellCompleter::new(
        Shell::command_names(),
        shell.completion_cell(),
    ));

    let mut line_editor = Reedline::create()
        .with_completer(completer)
        .with_edit_mode(edit_mode)
        .with_menu(ReedlineMenu::EngineCompleter(completion_menu))
        .with_hinter(hinter)
        .with_history(history);

    let mut prompt = ShellPrompt::default();
    loop {
        prompt.update(shell.prompt());
        match line_editor.read_line(&prompt) {
            Ok(Signal::Success(line)) => {
                if !shell.dispatch(Some(&line)) {
                    break;
                }
            }
            Ok(Signal::CtrlC) => continue,
            Ok(Signal::CtrlD) => {
                shell.dispatch(None);
                break;
            }
            Err(e) => {
                eprintln!("Read line error: {e}");
                shell.dispatch(None);
                break;
            }
        }
    }
}
