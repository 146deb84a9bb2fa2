//! Issues a signed session token for a user.
//!
//! ```bash
//! TOKEN_SECRET=... commerce-token --user-id 42
//! ```

use std::time::Duration;

use clap::Parser;
use common::UserId;
use domain::SignedTokenResolver;

#[derive(Debug, Parser)]
#[command(name = "commerce-token", about = "Issue a bearer token for the commerce API")]
struct Args {
    /// User the token identifies.
    #[arg(long)]
    user_id: i64,

    /// HMAC key shared with the API server.
    #[arg(long, env = "TOKEN_SECRET", hide_env_values = true)]
    secret: String,

    /// Token lifetime in seconds.
    #[arg(long, env = "TOKEN_TTL_SECS", default_value_t = 86_400)]
    ttl_secs: u64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let user_id = UserId::new(args.user_id);
    if !user_id.is_valid() {
        return Err(format!("user id must be positive, got {user_id}").into());
    }

    let resolver = SignedTokenResolver::new(args.secret.as_bytes(), Duration::from_secs(args.ttl_secs))?;
    println!("{}", resolver.issue(user_id));
    Ok(())
}
