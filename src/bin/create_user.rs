// Create a user, or reset the password of an existing one.
// Usage: cargo run --bin create_user -- <username> <password>

use std::env;
use std::sync::Arc;

use bcrypt::{hash, DEFAULT_COST};
use wallet_ledger_api::{
    accounts::PgUserStore, database, services::AuthService, AuthError, Config,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 3 {
        eprintln!("Usage: cargo run --bin create_user -- <username> <password>");
        eprintln!("Example: cargo run --bin create_user -- alice correct-horse");
        std::process::exit(1);
    }

    let username = args[1].trim();
    let password = &args[2];

    dotenv::dotenv().ok();
    let config = Config::from_env()?;
    let pool = database::new_pool(&config).await?;
    let users = PgUserStore::new(pool);
    let auth = AuthService::new(Arc::new(users.clone()), config.jwt_secret.clone(), config.jwt_expiration);

    match auth.sign_up(username, password).await {
        Ok(user_id) => println!("User created: {} ({})", username, user_id),
        Err(AuthError::UserAlreadyExists) => {
            let password_hash = hash(password, DEFAULT_COST)?;
            users.update_password_hash(username, &password_hash).await?;
            println!("Password updated for user: {}", username);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }

    println!("\nYou can now sign in at POST /auth/sign-in with these credentials.");

    Ok(())
}
