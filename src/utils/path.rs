use std::env;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use log::{debug, error};

pub fn is_executable(path: &Path) -> bool {
    match path.metadata() {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

/// Resolves `argv[0]` to an executable: names containing `/` are used as
/// given, anything else is searched for in the `:`-separated `search_path`.
pub fn find_executable(name: &str, search_path: Option<&str>) -> Option<PathBuf> {
    if name.is_empty() {
        return None;
    }
    if name.contains('/') {
        let path = PathBuf::from(name);
        return is_executable(&path).then_some(path);
    }

    search_path?
        .split(':')
        // 空目录项表示当前目录
        .map(|dir| Path::new(if dir.is_empty() { "." } else { dir }).join(name))
        .find(|candidate| is_executable(candidate))
        .inspect(|found| debug!("找到可执行文件: {}", found.display()))
}

pub fn current_dir() -> String {
    match env::current_dir() {
        Ok(dir) => dir.to_string_lossy().into_owned(),
        Err(e) => {
            error!("forksh: env current_dir error: {}", e);
            String::new()
        }
    }
}
