//! Post commands
//!
//! Parse arguments, validate the submission, call the posts service and
//! shape the JSON result.

use crate::app::AppState;
use crate::config::validate_page_size;
use crate::database::PageRequest;
use crate::error::{AppError, Result};
use crate::validation::{validate_create, validate_update, ImageKind, ImageUpload, PostForm};
use clap::ArgMatches;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// List posts, newest first
pub async fn list(state: &AppState, args: &ArgMatches) -> Result<Value> {
    let page = args.get_one::<u32>("page").copied().unwrap_or(1);
    let per_page = match args.get_one::<u32>("per-page") {
        Some(size) => validate_page_size(*size)?,
        None => state.config.page_size,
    };

    let posts = state.posts.list(PageRequest::new(page, per_page)).await?;

    Ok(json!({
        "success": true,
        "data": posts,
    }))
}

/// Show a single post
pub async fn show(state: &AppState, args: &ArgMatches) -> Result<Value> {
    let post = state.posts.get(post_id(args)).await?;

    Ok(json!({
        "success": true,
        "data": post,
    }))
}

/// Create a post
pub async fn create(state: &AppState, args: &ArgMatches) -> Result<Value> {
    let form = read_form(args).await?;
    let new_post = validate_create(form)?;

    let post = state.posts.create(new_post).await?;

    Ok(json!({
        "success": true,
        "message": "Post created",
        "data": post,
    }))
}

/// Update a post
pub async fn update(state: &AppState, args: &ArgMatches) -> Result<Value> {
    let id = post_id(args);
    let form = read_form(args).await?;
    let changes = validate_update(form)?;

    let post = state.posts.update(id, changes).await?;

    Ok(json!({
        "success": true,
        "message": "Post updated",
        "data": post,
    }))
}

/// Delete a post
pub async fn delete(state: &AppState, args: &ArgMatches) -> Result<Value> {
    let id = post_id(args);
    state.posts.delete(id).await?;

    Ok(json!({
        "success": true,
        "message": "Post deleted",
        "id": id,
    }))
}

/// Write a post image to a file
pub async fn export_image(state: &AppState, args: &ArgMatches) -> Result<Value> {
    let output = args
        .get_one::<PathBuf>("output")
        .ok_or_else(|| AppError::Config("--output is required".to_string()))?;
    let (post, data) = state.posts.image(post_id(args)).await?;

    tokio::fs::write(output, &data).await?;

    Ok(json!({
        "success": true,
        "id": post.id,
        "image": post.image,
        "mime_type": ImageKind::from_key(&post.image).map(ImageKind::mime_type),
        "bytes": data.len(),
        "output": output.display().to_string(),
    }))
}

/// Remove orphaned images
pub async fn sweep(state: &AppState, args: &ArgMatches) -> Result<Value> {
    let grace = args.get_one::<u64>("grace-secs").copied().unwrap_or(0);
    let removed = state.posts.sweep_orphans(Duration::from_secs(grace)).await?;

    Ok(json!({
        "success": true,
        "message": format!("Removed {} orphaned image(s)", removed.len()),
        "removed": removed,
    }))
}

fn post_id(args: &ArgMatches) -> &str {
    args.get_one::<String>("id").map(String::as_str).unwrap_or_default()
}

async fn read_form(args: &ArgMatches) -> Result<PostForm> {
    let image = match args.get_one::<PathBuf>("image") {
        Some(path) => Some(read_upload(path).await?),
        None => None,
    };

    Ok(PostForm {
        title: args.get_one::<String>("title").cloned(),
        content: args.get_one::<String>("content").cloned(),
        image,
    })
}

async fn read_upload(path: &Path) -> Result<ImageUpload> {
    let bytes = tokio::fs::read(path).await?;

    Ok(ImageUpload {
        filename: path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned()),
        bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{cli, dispatch};
    use crate::config::AppConfig;
    use crate::validation::test_images;
    use tempfile::TempDir;

    async fn create_test_state() -> (AppState, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = AppConfig {
            data_dir: temp_dir.path().join("data"),
            ..AppConfig::default()
        };
        let state = AppState::initialize(config).await.unwrap();
        (state, temp_dir)
    }

    async fn run(state: &AppState, args: &[&str]) -> Result<Value> {
        let argv = std::iter::once("postboard").chain(args.iter().copied());
        let matches = cli().try_get_matches_from(argv).unwrap();
        dispatch(state, &matches).await
    }

    #[tokio::test]
    async fn test_create_show_update_delete() {
        let (state, temp) = create_test_state().await;
        let image_path = temp.path().join("photo.png");
        tokio::fs::write(&image_path, test_images::png(3)).await.unwrap();
        let image_arg = image_path.to_str().unwrap();

        let created = run(
            &state,
            &["create", "--title", "Hello world", "--content", "A first post body", "--image", image_arg],
        )
        .await
        .unwrap();
        assert_eq!(created["message"], "Post created");
        let id = created["data"]["id"].as_str().unwrap().to_string();

        let shown = run(&state, &["show", &id]).await.unwrap();
        assert_eq!(shown["data"]["title"], "Hello world");

        let updated = run(
            &state,
            &["update", &id, "--title", "Hello again", "--content", "An edited post body"],
        )
        .await
        .unwrap();
        assert_eq!(updated["data"]["title"], "Hello again");
        assert_eq!(updated["data"]["image"], created["data"]["image"]);

        let out_path = temp.path().join("exported.png");
        let exported = run(&state, &["image", &id, "--output", out_path.to_str().unwrap()])
            .await
            .unwrap();
        assert_eq!(exported["bytes"], test_images::png(3).len());
        assert_eq!(exported["mime_type"], "image/png");
        assert_eq!(tokio::fs::read(&out_path).await.unwrap(), test_images::png(3));

        let deleted = run(&state, &["delete", &id]).await.unwrap();
        assert_eq!(deleted["message"], "Post deleted");

        let result = run(&state, &["show", &id]).await;
        assert!(matches!(result, Err(AppError::PostNotFound(_))));
    }

    #[tokio::test]
    async fn test_create_reports_validation_errors() {
        let (state, _temp) = create_test_state().await;

        let result = run(&state, &["create", "--title", "Hey", "--content", "Too short"]).await;

        match result {
            Err(AppError::Validation(errors)) => {
                assert!(errors.has("title"));
                assert!(errors.has("content"));
                assert!(errors.has("image"));
            }
            other => panic!("expected validation failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_list_uses_configured_page_size() {
        let (state, temp) = create_test_state().await;
        let image_path = temp.path().join("photo.jpg");
        tokio::fs::write(&image_path, test_images::jpeg(9)).await.unwrap();

        for i in 1..=7 {
            let title = format!("Post number {}", i);
            run(
                &state,
                &["create", "--title", &title, "--content", "Body text long enough", "--image", image_path.to_str().unwrap()],
            )
            .await
            .unwrap();
        }

        let listed = run(&state, &["list"]).await.unwrap();
        let items = listed["data"]["items"].as_array().unwrap();
        assert_eq!(items.len(), 5);
        assert_eq!(items[0]["title"], "Post number 7");
        assert_eq!(listed["data"]["total"], 7);

        let second = run(&state, &["list", "--page", "2", "--per-page", "5"]).await.unwrap();
        assert_eq!(second["data"]["items"].as_array().unwrap().len(), 2);

        let result = run(&state, &["list", "--per-page", "0"]).await;
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_image_requires_output() {
        let result = cli().try_get_matches_from(["postboard", "image", "some-id"]);
        assert_eq!(
            result.unwrap_err().kind(),
            clap::error::ErrorKind::MissingRequiredArgument
        );
    }

    #[tokio::test]
    async fn test_sweep_reports_removed_keys() {
        let (state, _temp) = create_test_state().await;

        let swept = run(&state, &["sweep", "--grace-secs", "0"]).await.unwrap();
        assert_eq!(swept["removed"].as_array().unwrap().len(), 0);
    }
}
