//! Working directory resolution for the built-in `cd`.
//!
//! Every command runs in its own process, so `cd` never reaches a shell:
//! the target is resolved here and stored on the session.

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CwdError {
    #[error("cd: no previous directory")]
    NoPrevious,
    #[error("cd: cannot determine home directory")]
    NoHome,
    #[error("cd: {0}: No such file or directory")]
    NotFound(String),
    #[error("cd: {0}: Not a directory")]
    NotADirectory(String),
}

pub fn home_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf())
}

/// Replace a leading `~` with the home directory.
pub fn resolve_tilde(path: &str, home: Option<&Path>) -> Result<PathBuf, CwdError> {
    if path == "~" {
        return home.map(Path::to_path_buf).ok_or(CwdError::NoHome);
    }
    if let Some(rest) = path.strip_prefix("~/") {
        let home = home.ok_or(CwdError::NoHome)?;
        return Ok(home.join(rest));
    }
    Ok(PathBuf::from(path))
}

/// Expand `$NAME` and `${NAME}` the way a shell would for a `cd` target.
/// Unset variables expand to nothing; a `$` not followed by a name is kept.
pub fn expand_vars(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        let braced = chars.peek() == Some(&'{');
        if braced {
            chars.next();
        }
        let mut name = String::new();
        while let Some(&n) = chars.peek() {
            if n.is_ascii_alphanumeric() || n == '_' {
                name.push(n);
                chars.next();
            } else {
                break;
            }
        }
        if braced {
            if chars.peek() == Some(&'}') && !name.is_empty() {
                chars.next();
            } else {
                out.push_str("${");
                out.push_str(&name);
                continue;
            }
        }
        if name.is_empty() {
            out.push('$');
            continue;
        }
        out.push_str(&lookup(&name).unwrap_or_default());
    }
    out
}

/// Resolve a `cd` argument against the current and previous directories.
///
/// `None` and `~` go home, `-` goes back. The result is canonical and
/// guaranteed to be an existing directory.
pub fn resolve_cd(
    target: Option<&str>,
    cwd: &Path,
    previous: Option<&Path>,
    home: Option<&Path>,
) -> Result<PathBuf, CwdError> {
    let raw = match target.map(str::trim) {
        None | Some("") => home.map(Path::to_path_buf).ok_or(CwdError::NoHome)?,
        Some("-") => previous.map(Path::to_path_buf).ok_or(CwdError::NoPrevious)?,
        Some(t) => resolve_tilde(t, home)?,
    };

    let joined = if raw.is_absolute() { raw } else { cwd.join(raw) };
    let display = joined.display().to_string();

    let canonical = joined
        .canonicalize()
        .map_err(|_| CwdError::NotFound(display.clone()))?;
    if !canonical.is_dir() {
        return Err(CwdError::NotADirectory(display));
    }
    Ok(canonical)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_vars() {
        let lookup = |name: &str| match name {
            "HOME" => Some("/home/me".to_string()),
            "PROJECT" => Some("/srv/app".to_string()),
            _ => None,
        };
        assert_eq!(expand_vars("$HOME", lookup), "/home/me");
        assert_eq!(expand_vars("${PROJECT}/src", lookup), "/srv/app/src");
        assert_eq!(expand_vars("$PROJECT/src", lookup), "/srv/app/src");
        assert_eq!(expand_vars("a/$UNSET/b", lookup), "a//b");
        assert_eq!(expand_vars("cost$", lookup), "cost$");
        assert_eq!(expand_vars("${oops", lookup), "${oops");
        assert_eq!(expand_vars("plain", lookup), "plain");
    }

    #[test]
    fn test_relative_and_parent() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        std::fs::create_dir(root.join("sub")).unwrap();

        let sub = resolve_cd(Some("sub"), &root, None, None).unwrap();
        assert_eq!(sub, root.join("sub"));
        let up = resolve_cd(Some(".."), &sub, None, None).unwrap();
        assert_eq!(up, root);
    }

    #[test]
    fn test_home_and_previous() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        assert_eq!(resolve_cd(None, Path::new("/"), None, Some(&root)).unwrap(), root);
        assert_eq!(
            resolve_cd(Some("-"), Path::new("/"), Some(&root), None).unwrap(),
            root
        );
        assert_eq!(
            resolve_cd(Some("-"), Path::new("/"), None, None),
            Err(CwdError::NoPrevious)
        );
    }

    #[test]
    fn test_missing_and_file_targets() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        std::fs::write(root.join("file.txt"), "x").unwrap();

        assert!(matches!(
            resolve_cd(Some("nope"), &root, None, None),
            Err(CwdError::NotFound(_))
        ));
        assert!(matches!(
            resolve_cd(Some("file.txt"), &root, None, None),
            Err(CwdError::NotADirectory(_))
        ));
    }

    #[test]
    fn test_tilde() {
        let home = Path::new("/home/me");
        assert_eq!(
            resolve_tilde("~/src", Some(home)).unwrap(),
            PathBuf::from("/home/me/src")
        );
        assert_eq!(resolve_tilde("~x", Some(home)).unwrap(), PathBuf::from("~x"));
        assert_eq!(resolve_tilde("~", None), Err(CwdError::NoHome));
    }
}
