//! Password handling for CLI operations.

use rpassword::prompt_password;
use unrar_session::Password;

/// Wraps a password given on the command line
pub fn from_args(provided: Option<String>) -> Option<Password> {
    provided.map(Password::new)
}

/// Prompts the user once; an empty answer means "no password"
pub fn prompt(archive: &str) -> Option<Password> {
    match prompt_password(format!("Enter password for {}: ", archive)) {
        Ok(pwd) if !pwd.is_empty() => Some(Password::new(pwd)),
        Ok(_) => None,
        Err(e) => {
            eprintln!("Cannot read password: {}", e);
            None
        }
    }
}
