//! Check node access for a user against the running instance, without
//! going through a PAM stack.

use anyhow::{bail, Result};
use clap::Parser;
use flux_client::LibFluxConnector;
use pam_flux::{Authorizer, Conversation, SystemUsers, ALLOW_GUEST_USER};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "pam-flux-check", about = "Check whether a user may log in to this node")]
struct Cli {
    /// User name to check
    #[arg(short, long)]
    user: String,

    /// Also admit guests of multi-user instance jobs
    #[arg(long)]
    allow_guest_user: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Prints what a PAM application would show the user.
struct Terminal;

impl Conversation for Terminal {
    fn error_message(&mut self, message: &str) -> pam_flux::Result<()> {
        eprintln!("{message}");
        Ok(())
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut args = Vec::new();
    if cli.allow_guest_user {
        args.push(ALLOW_GUEST_USER);
    }

    let verdict = Authorizer::new(LibFluxConnector::new(), &SystemUsers).authorize(
        Some(cli.user.as_str()),
        &args,
        &mut Terminal,
    );
    println!("{}: {verdict}", cli.user);

    if !verdict.is_granted() {
        bail!("access {verdict} for {}", cli.user);
    }
    Ok(())
}
