//! Command line interface
//!
//! One subcommand per post action:
//! - `list`: newest-first listing, paginated
//! - `show`: a single post
//! - `create` / `update` / `delete`: write operations
//! - `image`: export a post image to a file
//! - `sweep`: remove orphaned images

pub mod posts;

use crate::app::AppState;
use crate::error::{AppError, Result};
use clap::{value_parser, Arg, ArgMatches, Command};
use serde_json::{json, Value};
use std::path::PathBuf;

/// Build the command line definition
pub fn cli() -> Command {
    Command::new("postboard")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Manage blog posts and their images")
        .subcommand_required(true)
        .arg(
            Arg::new("data-dir")
                .long("data-dir")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Directory holding the database and image storage (overrides POSTBOARD_DATA_DIR)"),
        )
        .subcommand(
            Command::new("list")
                .about("List posts, newest first")
                .arg(
                    Arg::new("page")
                        .long("page")
                        .default_value("1")
                        .value_parser(value_parser!(u32).range(1..))
                        .help("Page number, starting at 1"),
                )
                .arg(
                    Arg::new("per-page")
                        .long("per-page")
                        .value_parser(value_parser!(u32))
                        .help("Posts per page (defaults to POSTBOARD_PAGE_SIZE or 5)"),
                ),
        )
        .subcommand(
            Command::new("show")
                .about("Show a single post")
                .arg(Arg::new("id").required(true).help("Post ID")),
        )
        .subcommand(
            Command::new("create")
                .about("Create a post")
                .arg(Arg::new("title").long("title").help("Post title (min 5 characters)"))
                .arg(Arg::new("content").long("content").help("Post content (min 10 characters)"))
                .arg(
                    Arg::new("image")
                        .long("image")
                        .value_parser(value_parser!(PathBuf))
                        .help("JPEG or PNG file, at most 2 MiB"),
                ),
        )
        .subcommand(
            Command::new("update")
                .about("Update a post, optionally replacing its image")
                .arg(Arg::new("id").required(true).help("Post ID"))
                .arg(Arg::new("title").long("title").help("Post title (min 5 characters)"))
                .arg(Arg::new("content").long("content").help("Post content (min 10 characters)"))
                .arg(
                    Arg::new("image")
                        .long("image")
                        .value_parser(value_parser!(PathBuf))
                        .help("Replacement JPEG or PNG file, at most 2 MiB"),
                ),
        )
        .subcommand(
            Command::new("delete")
                .about("Delete a post and its image")
                .arg(Arg::new("id").required(true).help("Post ID")),
        )
        .subcommand(
            Command::new("image")
                .about("Write a post's image to a file")
                .arg(Arg::new("id").required(true).help("Post ID"))
                .arg(
                    Arg::new("output")
                        .long("output")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Destination file"),
                ),
        )
        .subcommand(
            Command::new("sweep")
                .about("Remove stored images that no post references")
                .arg(
                    Arg::new("grace-secs")
                        .long("grace-secs")
                        .default_value("3600")
                        .value_parser(value_parser!(u64))
                        .help("Skip images modified within this many seconds"),
                ),
        )
}

/// Run the selected subcommand and return its JSON output
pub async fn dispatch(state: &AppState, matches: &ArgMatches) -> Result<Value> {
    match matches.subcommand() {
        Some(("list", args)) => posts::list(state, args).await,
        Some(("show", args)) => posts::show(state, args).await,
        Some(("create", args)) => posts::create(state, args).await,
        Some(("update", args)) => posts::update(state, args).await,
        Some(("delete", args)) => posts::delete(state, args).await,
        Some(("image", args)) => posts::export_image(state, args).await,
        Some(("sweep", args)) => posts::sweep(state, args).await,
        Some((other, _)) => Err(AppError::Config(format!("Unknown command: {}", other))),
        None => Err(AppError::Config("No command given".to_string())),
    }
}

/// JSON body describing a failed command
pub fn error_output(error: &AppError) -> Value {
    let mut body = json!({
        "success": false,
        "error": error.kind(),
        "message": error.to_string(),
    });

    if let AppError::Validation(fields) = error {
        body["fields"] = json!(fields);
    }

    body
}

/// Process exit code for a failed command
pub fn exit_code(error: &AppError) -> u8 {
    match error {
        AppError::Validation(_) => 2,
        AppError::PostNotFound(_) => 3,
        AppError::Config(_) => 4,
        _ => 1,
    }
}
