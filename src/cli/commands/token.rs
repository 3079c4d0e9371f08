//! Token command - generate an access token

use crate::auth::generate_token;
use crate::cli::args::TokenArgs;
use crate::config::ENV_ACCESS_TOKEN;
use crate::error::QuillResult;
use console::style;

pub async fn execute(args: TokenArgs) -> QuillResult<()> {
    println!("{}", generate_token(usize::from(args.length)));
    eprintln!(
        "{}",
        style(format!(
            "Store it as auth.token in the config file or export {}",
            ENV_ACCESS_TOKEN
        ))
        .dim()
    );
    Ok(())
}
