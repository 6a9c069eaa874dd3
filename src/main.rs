use std::io::Write;

use anyhow::Result;
use inquire::{Confirm, InquireError, Select};
use log::error;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use nbctl::config::Config;
use nbctl::installer;
use nbctl::paths::StatePaths;
use nbctl::runner::{CommandRunner, SystemRunner};
use nbctl::supervisor::{self, Supervisor};
use nbctl::wizard;

const MENU_INSTALL: &str = "Install / reconfigure";
const MENU_START: &str = "Start server";
const MENU_STOP: &str = "Stop server";
const MENU_UNINSTALL: &str = "Uninstall";
const MENU_EXIT: &str = "Exit";

fn main() {
    // Quiet by default so log lines do not fight the prompts; RUST_LOG
    // still turns them back on.
    env_logger::Builder::from_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                buf.timestamp_millis(),
                record.level(),
                record.args()
            )
        })
        .filter_level(log::LevelFilter::Warn)
        .init();

    if let Err(e) = real_main() {
        error!("{e:#}");
        std::process::exit(1);
    }
}

fn real_main() -> Result<()> {
    let paths = StatePaths::discover()?;
    let runner = SystemRunner;

    show_banner();

    loop {
        // Config is re-read before every operation so hand edits to the
        // file take effect immediately.
        let cfg = Config::load(&paths.config_file);
        let sup = Supervisor::new(&paths, &runner);
        show_status(&sup.status(&cfg));

        let options = vec![MENU_INSTALL, MENU_START, MENU_STOP, MENU_UNINSTALL, MENU_EXIT];
        let choice = match Select::new("Select an operation:", options).prompt() {
            Ok(choice) => choice,
            Err(InquireError::OperationCanceled | InquireError::OperationInterrupted) => break,
            Err(e) => return Err(anyhow::anyhow!("Prompt failed: {}", e)),
        };

        let outcome = match choice {
            MENU_INSTALL => do_install(&cfg, &paths, &runner),
            MENU_START => do_start(&cfg, &paths, &runner),
            MENU_STOP => do_stop(&paths, &runner),
            MENU_UNINSTALL => do_uninstall(&cfg, &paths, &runner),
            _ => break,
        };

        if let Err(e) = outcome {
            print_colored(Color::Red, &format!("✗ {e:#}"));
        }
        println!();
    }

    println!("Bye.");
    Ok(())
}

fn do_install(cfg: &Config, paths: &StatePaths, runner: &dyn CommandRunner) -> Result<()> {
    let Some(cfg) = wizard::run(cfg, &paths.config_file)? else {
        println!("Installation cancelled.");
        return Ok(());
    };
    installer::install(&cfg, paths, runner)?;
    print_colored(Color::Green, "✓ Installation complete");
    Ok(())
}

fn do_start(cfg: &Config, paths: &StatePaths, runner: &dyn CommandRunner) -> Result<()> {
    let sup = Supervisor::new(paths, runner);
    let outcome = sup.start(cfg)?;
    print_colored(Color::Green, &format!("✓ Server started (pid {})", outcome.pid));

    if let Some(url) = outcome.access_url {
        println!("  Local:  {url}");
    }
    if let Some(ip) = supervisor::public_ip() {
        let scheme = if cfg.use_tls { "https" } else { "http" };
        println!("  Remote: {scheme}://{ip}:{}/", cfg.port);
    }
    Ok(())
}

fn do_stop(paths: &StatePaths, runner: &dyn CommandRunner) -> Result<()> {
    Supervisor::new(paths, runner).stop()?;
    print_colored(Color::Green, "✓ Server stopped");
    Ok(())
}

fn do_uninstall(cfg: &Config, paths: &StatePaths, runner: &dyn CommandRunner) -> Result<()> {
    let proceed = wizard::prompt_or_cancel(
        Confirm::new("Remove the notebook environment and all controller state?")
            .with_default(false)
            .prompt(),
    )?;
    if proceed != Some(true) {
        println!("Uninstall cancelled.");
        return Ok(());
    }
    installer::uninstall(cfg, paths, runner)?;
    print_colored(Color::Green, "✓ Uninstalled");
    Ok(())
}

fn show_banner() {
    let mut stdout = StandardStream::stdout(ColorChoice::Always);
    let _ = stdout.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)));
    let _ = writeln!(stdout, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    let _ = stdout.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)).set_bold(true));
    let _ = writeln!(stdout, "  nbctl — notebook server controller");
    let _ = stdout.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)));
    let _ = writeln!(stdout, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    let _ = stdout.reset();
    let _ = writeln!(stdout);
}

fn show_status(status: &supervisor::Status) {
    let mut stdout = StandardStream::stdout(ColorChoice::Always);

    let _ = write!(stdout, "Installed: ");
    if status.installed {
        let _ = stdout.set_color(ColorSpec::new().set_fg(Some(Color::Green)));
        let _ = write!(stdout, "yes");
    } else {
        let _ = stdout.set_color(ColorSpec::new().set_fg(Some(Color::Yellow)));
        let _ = write!(stdout, "no");
    }
    let _ = stdout.reset();

    let _ = write!(stdout, "   Server: ");
    match status.running {
        Some(pid) => {
            let _ = stdout.set_color(ColorSpec::new().set_fg(Some(Color::Green)));
            let _ = write!(stdout, "running (pid {pid})");
        }
        None => {
            let _ = stdout.set_color(ColorSpec::new().set_fg(Some(Color::Yellow)));
            let _ = write!(stdout, "stopped");
        }
    }
    let _ = stdout.reset();

    let _ = writeln!(
        stdout,
        "   Port: {}   TLS: {}",
        status.port,
        if status.tls { "on" } else { "off" }
    );
    let _ = writeln!(stdout);
}

fn print_colored(color: Color, message: &str) {
    let mut stdout = StandardStream::stdout(ColorChoice::Always);
    let _ = stdout.set_color(ColorSpec::new().set_fg(Some(color)));
    let _ = writeln!(stdout, "{message}");
    let _ = stdout.reset();
}
