use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

/// Turn a multipart part filename into a relative path safe to join onto
/// the download directory.
///
/// Backslashes are treated as separators and `.` components are dropped.
/// Absolute names and `..` components are rejected outright rather than
/// normalized away, since a server sending them is misbehaving.
pub fn sanitize_part_name(name: &str) -> Result<PathBuf> {
    let unified = name.replace('\\', "/");
    let mut result = PathBuf::new();

    for component in Path::new(&unified).components() {
        match component {
            Component::Normal(part) => result.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(Error::protocol(format!(
                    "unsafe part filename in multipart response: {name:?}"
                )));
            }
        }
    }

    if result.as_os_str().is_empty() {
        return Err(Error::protocol(format!("empty part filename in multipart response: {name:?}")));
    }
    Ok(result)
}
