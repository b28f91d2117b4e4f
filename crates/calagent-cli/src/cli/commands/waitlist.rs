//! Waitlist command handlers.

use anyhow::{Context, Result};
use calagent_core::config::Config;
use calagent_core::waitlist::{WaitlistClient, WaitlistError, WaitlistSignup};
use chrono::Utc;

#[derive(clap::Args, Debug)]
pub struct JoinArgs {
    #[arg(long)]
    email: String,

    #[arg(long)]
    name: String,

    /// Feature of interest (repeatable)
    #[arg(long = "feature", value_name = "FEATURE")]
    features: Vec<String>,

    /// Primary usage, e.g. work or personal
    #[arg(long)]
    usage: String,

    /// Current calendar tool
    #[arg(long)]
    calendar: String,

    /// Role or profession
    #[arg(long)]
    role: String,

    #[arg(long, default_value = "")]
    company: String,

    /// Biggest scheduling frustration
    #[arg(long, default_value = "")]
    frustration: String,

    /// How you heard about us
    #[arg(long, default_value = "")]
    referral: String,
}

impl JoinArgs {
    fn into_signup(self) -> WaitlistSignup {
        let mut signup =
            WaitlistSignup::new(self.email, self.name, Utc::now()).with_features(&self.features);
        signup.primary_usage = self.usage;
        signup.current_calendar_tool = self.calendar;
        signup.role_profession = self.role;
        signup.company = self.company;
        signup.scheduling_frustration = self.frustration;
        signup.referral_source = self.referral;
        signup
    }
}

pub async fn stats(config: &Config) -> Result<()> {
    let stats = WaitlistClient::new(&config.api_base_url)
        .stats()
        .await
        .context("fetch waitlist stats")?;
    println!("Waitlist signups: {}", stats.total);
    Ok(())
}

pub async fn join(config: &Config, args: JoinArgs) -> Result<()> {
    let signup = args.into_signup();
    match WaitlistClient::new(&config.api_base_url).join(&signup).await {
        Ok(()) => {
            println!("✓ Joined the waitlist as {}", signup.email);
            Ok(())
        }
        Err(WaitlistError::AlreadyJoined) => {
            println!("{} is already on the waitlist.", signup.email);
            Ok(())
        }
        Err(err) => Err(err).context("join waitlist"),
    }
}
