// Copyright (c) 2026 asm-lens Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::env;
use std::path::Path;
use urlencoding::decode;

/// Normalizes a user supplied path so that two spellings of the same file map to
/// the same registry key. Accepts `file://` URIs as sent by editor front ends.
pub fn canonicalize_path(source_path: &str) -> String {
    let mut path_str = source_path.trim().to_string();

    if let Some(rest) = path_str.strip_prefix("file://") {
        let decoded = decode(rest).map(|s| s.into_owned()).unwrap_or_else(|_| rest.to_string());
        path_str = decoded;

        // file:///C:/... arrives as /C:/...
        if cfg!(windows) && path_str.starts_with('/') && path_str.chars().nth(2) == Some(':') {
            path_str.remove(0);
        }
    }

    // WSL mount paths only mean something to a Windows host.
    if cfg!(windows) && path_str.starts_with("/mnt/") {
        let parts: Vec<&str> = path_str.split('/').collect();
        if parts.len() >= 3 && parts[2].len() == 1 {
            let drive_letter = parts[2].to_uppercase();
            let remaining = parts[3..].join("/");
            path_str = format!("{}:/{}", drive_letter, remaining);
        }
    }

    let path = Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir().unwrap_or_default().join(path)
    };

    // Falls back to the lexical path when the file does not exist (yet).
    let canonical = dunce::canonicalize(&absolute).unwrap_or(absolute);
    let mut final_path = canonical.to_string_lossy().replace('\\', "/");

    if cfg!(windows) && final_path.chars().nth(1) == Some(':') {
        let drive: String = final_path.chars().take(1).flat_map(char::to_uppercase).collect();
        final_path = format!("{}{}", drive, &final_path[1..]);
    }

    final_path
}

/// Splits source text into display lines, dropping the `\r` of CRLF endings.
pub fn split_lines(text: &str) -> Vec<String> {
    text.lines().map(|l| l.trim_end_matches('\r').to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_uri_and_plain_path_agree() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a b.bin");
        std::fs::write(&file, b"x").unwrap();

        let plain = canonicalize_path(file.to_str().unwrap());
        let uri = format!("file://{}", file.to_str().unwrap().replace(' ', "%20"));
        assert_eq!(canonicalize_path(&uri), plain);
    }

    #[test]
    fn dot_segments_are_resolved() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("prog"), b"x").unwrap();

        let direct = canonicalize_path(dir.path().join("prog").to_str().unwrap());
        let dotted = canonicalize_path(dir.path().join("sub/../prog").to_str().unwrap());
        assert_eq!(direct, dotted);
    }

    #[test]
    fn missing_files_keep_their_spelling() {
        let p = canonicalize_path("/definitely/not/here.elf");
        assert!(p.ends_with("/definitely/not/here.elf"));
    }

    #[test]
    fn crlf_lines() {
        assert_eq!(split_lines("a\r\nb\n\nc"), vec!["a", "b", "", "c"]);
    }
}
