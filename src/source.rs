//! Where the diff comes from: stdin, a file, `git diff`, or a URL.

use std::io::Read;
use std::path::PathBuf;
use std::process::Command;

use anyhow::{bail, Context, Result};

pub trait DiffSource {
    /// Short human-readable origin, used in log and error messages.
    fn describe(&self) -> String;

    /// Fetch the raw diff bytes.
    fn read(&self) -> Result<Vec<u8>>;
}

pub struct StdinSource;

impl DiffSource for StdinSource {
    fn describe(&self) -> String {
        "stdin".to_string()
    }

    fn read(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        std::io::stdin()
            .read_to_end(&mut buf)
            .context("Failed to read diff from stdin")?;
        Ok(buf)
    }
}

pub struct FileSource {
    pub path: PathBuf,
}

impl DiffSource for FileSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn read(&self) -> Result<Vec<u8>> {
        std::fs::read(&self.path)
            .with_context(|| format!("Failed to read diff file: {}", self.path.display()))
    }
}

/// Runs `git diff <args...>` in the working directory (or `cwd`).
pub struct GitSource {
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl GitSource {
    /// Split a whitespace-separated argument string, e.g. `"main...HEAD"`.
    pub fn from_arg_string(args: &str) -> Self {
        Self {
            args: args.split_whitespace().map(str::to_string).collect(),
            cwd: None,
        }
    }
}

impl DiffSource for GitSource {
    fn describe(&self) -> String {
        format!("git diff {}", self.args.join(" "))
    }

    fn read(&self) -> Result<Vec<u8>> {
        let mut command = Command::new("git");
        command.arg("diff").args(&self.args);
        if let Some(cwd) = &self.cwd {
            command.current_dir(cwd);
        }
        let output = command.output().context("Failed to run git diff")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("git diff failed: {}", stderr.trim());
        }
        Ok(output.stdout)
    }
}

/// Fetches a diff over HTTP(S) with a GET request.
pub struct UrlSource {
    pub url: String,
    /// Sent as a bearer token when set.
    pub token: Option<String>,
}

impl DiffSource for UrlSource {
    fn describe(&self) -> String {
        self.url.clone()
    }

    fn read(&self) -> Result<Vec<u8>> {
        let mut request = ureq::get(&self.url)
            .set("Accept", "text/x-diff, text/plain, */*")
            .set("User-Agent", "diffcov");
        if let Some(token) = &self.token {
            request = request.set("Authorization", &format!("Bearer {token}"));
        }
        let resp = request
            .call()
            .with_context(|| format!("Failed to fetch diff from {}", self.url))?;
        let mut body = Vec::new();
        resp.into_reader()
            .read_to_end(&mut body)
            .context("Failed to read diff response body")?;
        Ok(body)
    }
}
