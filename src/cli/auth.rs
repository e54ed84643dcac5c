use crate::config::GoogleConfig;
use crate::error::{AppError, Result};
use crate::sheets::{GoogleAuth, clear_google_tokens};
use clap::Subcommand;
use dialoguer::Input;

#[derive(Subcommand, Debug)]
pub enum AuthCommand {
    /// Print the authorization URL to open in a browser
    Url,
    /// Complete authorization with the code from the browser
    Complete {
        /// Authorization code; prompted for when omitted
        #[arg(long)]
        code: Option<String>,
    },
    /// Delete the stored credential, forcing re-authorization
    Reset,
}

impl AuthCommand {
    pub async fn execute(&self) -> Result<()> {
        match self {
            AuthCommand::Url => generate_url(),
            AuthCommand::Complete { code } => complete(code.as_deref()).await,
            AuthCommand::Reset => clear_google_tokens(),
        }
    }
}

fn generate_url() -> Result<()> {
    let config = GoogleConfig::resolve()?;
    let auth = GoogleAuth::new(&config)?;

    println!("Open this URL in your browser:\n{}", auth.authorization_url());
    println!();
    println!("After authorizing, run: news-sheets auth complete --code YOUR_CODE");

    Ok(())
}

async fn complete(code: Option<&str>) -> Result<()> {
    let config = GoogleConfig::resolve()?;
    let auth = GoogleAuth::new(&config)?;

    let code = match code {
        Some(code) => code.to_string(),
        None => Input::new()
            .with_prompt("Authorization code")
            .interact_text()
            .map_err(|e| AppError::Config(format!("Failed to read authorization code: {}", e)))?,
    };

    auth.exchange_code(code.trim()).await?;

    Ok(())
}
