use mongodb::error::{CommandError, Error, ErrorKind, WriteError, WriteFailure};

use docrepo_core::error::RepositoryError;

const DUPLICATE_KEY: i32 = 11000;

/// Maps a driver error onto the repository error model.
///
/// Duplicate key failures, whether reported as a write error or by a find-and-modify
/// command, become [`RepositoryError::DuplicateKey`].
pub(crate) fn backend_error(error: Error, collection: &str) -> RepositoryError {
    let duplicate = match &*error.kind {
        ErrorKind::Write(WriteFailure::WriteError(WriteError { code, message, .. })) if *code == DUPLICATE_KEY => {
            Some(message.clone())
        }
        ErrorKind::Command(CommandError { code, message, .. }) if *code == DUPLICATE_KEY => Some(message.clone()),
        _ => None,
    };

    match duplicate {
        Some(message) => RepositoryError::DuplicateKey {
            key: duplicate_key(&message),
            collection: collection.to_string(),
        },
        None => RepositoryError::Backend(error.to_string()),
    }
}

/// Extracts the `dup key: { ... }` part of a server message, or the whole message.
fn duplicate_key(message: &str) -> String {
    message
        .split_once("dup key: ")
        .map(|(_, key)| {
            key.trim()
                .trim_start_matches('{')
                .trim_end_matches('}')
                .trim()
                .to_string()
        })
        .unwrap_or_else(|| message.to_string())
}

#[cfg(test)]
mod tests {
    use super::duplicate_key;

    #[test]
    fn extracts_duplicate_key_from_server_message() {
        let message = r#"E11000 duplicate key error collection: app.users index: email_-1 dup key: { email: "a@x" }"#;
        assert_eq!(duplicate_key(message), r#"email: "a@x""#);
        assert_eq!(duplicate_key("something else"), "something else");
    }
}
