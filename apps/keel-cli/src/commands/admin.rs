use anyhow::Result;
use clap::{Args, Subcommand};
use keel_api::SignInForm;
use keel_client::signin::{admin_sign_in, SIGNIN_SUCCESS};
use keel_client::AuthClient;
use keel_protocol::SessionView;

use super::ConnArgs;

#[derive(Subcommand, Clone, Debug)]
pub enum AdminCmd {
    /// Sign in to the admin dashboard (requires the admin role)
    SignIn(AdminSignInArgs),
    /// Sign in as an admin and list every user
    Users(AdminSignInArgs),
}

#[derive(Args, Clone, Debug)]
pub struct AdminSignInArgs {
    #[command(flatten)]
    pub conn: ConnArgs,
    #[arg(long)]
    pub email: String,
    /// Falls back to KEEL_ADMIN_PASSWORD
    #[arg(long, env = "KEEL_ADMIN_PASSWORD", hide_env_values = true)]
    pub password: String,
    /// Pretty-print JSON output
    #[arg(long)]
    pub pretty: bool,
}

pub async fn execute(cmd: AdminCmd) -> Result<()> {
    match cmd {
        AdminCmd::SignIn(args) => {
            let auth = AuthClient::new(args.conn.link()?);
            let session = sign_in(&auth, &args).await?;
            println!("{SIGNIN_SUCCESS}");
            println!("Signed in as {} ({})", session.user.email, session.user.role);
            Ok(())
        }
        AdminCmd::Users(args) => {
            let auth = AuthClient::new(args.conn.link()?);
            sign_in(&auth, &args).await?;
            let users = auth.list_users().await;
            if let Err(err) = auth.sign_out().await {
                tracing::debug!("sign-out failed: {err}");
            }
            let users = users?;
            let text = if args.pretty {
                serde_json::to_string_pretty(&users)?
            } else {
                serde_json::to_string(&users)?
            };
            println!("{text}");
            Ok(())
        }
    }
}

async fn sign_in(auth: &AuthClient, args: &AdminSignInArgs) -> Result<SessionView> {
    let form = SignInForm {
        email: args.email.clone(),
        password: args.password.clone(),
    };
    Ok(admin_sign_in(auth, &form).await?)
}
