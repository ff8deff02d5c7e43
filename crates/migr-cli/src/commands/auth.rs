use clap::Subcommand;
use migr_auth::{CredentialStore, KeyringStore, PLATFORM_TOKEN_KEY};
use migr_core::models::source::SourceType;

#[derive(Subcommand)]
pub enum AuthAction {
    /// Store a token in the OS keychain
    Set {
        /// "platform" or a source type (github, gitlab, ...)
        name: String,
        /// Token value (will prompt if not provided)
        #[arg(long)]
        token: Option<String>,
    },
    /// Remove a stored token
    Clear {
        /// "platform" or a source type
        name: String,
    },
}

/// Keychain key for a token name given on the command line.
pub fn credential_key(name: &str) -> anyhow::Result<String> {
    if name.eq_ignore_ascii_case("platform") {
        return Ok(PLATFORM_TOKEN_KEY.to_string());
    }
    let kind: SourceType = name.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    Ok(kind.credential_key())
}

pub fn run(action: AuthAction) -> anyhow::Result<()> {
    let store = KeyringStore::new();
    match action {
        AuthAction::Set { name, token } => {
            let key = credential_key(&name)?;
            let token = match token {
                Some(t) => t,
                None => {
                    eprint!("Enter token for {name}: ");
                    let mut input = String::new();
                    std::io::stdin().read_line(&mut input)?;
                    input.trim().to_string()
                }
            };
            if token.is_empty() {
                anyhow::bail!("Token cannot be empty");
            }

            store.store(&key, &token)?;
            println!("Token stored in OS keychain as '{key}'");
            Ok(())
        }
        AuthAction::Clear { name } => {
            let key = credential_key(&name)?;
            store.delete(&key)?;
            println!("Token '{key}' removed");
            Ok(())
        }
    }
}
