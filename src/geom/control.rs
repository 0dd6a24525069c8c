use std::fmt;

use tracing::info;

use crate::{cmd, error::InstallerError};

/// Verbs understood by the PART class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartVerb {
    Create,
    Add,
    Delete,
    Destroy,
    Commit,
    Undo,
}

impl PartVerb {
    pub fn as_str(self) -> &'static str {
        match self {
            PartVerb::Create => "create",
            PartVerb::Add => "add",
            PartVerb::Delete => "delete",
            PartVerb::Destroy => "destroy",
            PartVerb::Commit => "commit",
            PartVerb::Undo => "undo",
        }
    }

    /// Whether the verb changes geometry (and so must be staged).
    pub fn is_mutation(self) -> bool {
        !matches!(self, PartVerb::Commit | PartVerb::Undo)
    }
}

impl fmt::Display for PartVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One request to the geometry-control interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartRequest {
    pub verb: PartVerb,
    /// Provider or table the verb applies to.
    pub target: String,
    /// When set the change is held back until an explicit commit.
    pub staged: bool,
    pub params: Vec<(&'static str, String)>,
}

impl PartRequest {
    pub fn new(verb: PartVerb, target: &str) -> Self {
        PartRequest {
            verb,
            target: target.to_string(),
            staged: verb.is_mutation(),
            params: Vec::new(),
        }
    }

    pub fn param(mut self, key: &'static str, value: impl ToString) -> Self {
        self.params.push((key, value.to_string()));
        self
    }

    #[cfg(test)]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Translates the request into `gpart` arguments.
    pub fn to_gpart_args(&self) -> Vec<String> {
        let mut args = vec![self.verb.as_str().to_string()];
        for (key, value) in &self.params {
            let flag = match *key {
                "scheme" => "-s",
                "label" => "-l",
                "type" => "-t",
                "start" => "-b",
                "size" => "-s",
                "index" => "-i",
                _ => continue,
            };
            args.push(flag.to_string());
            args.push(value.clone());
        }
        if self.staged {
            // 'x' keeps the change pending until `gpart commit`
            args.push("-f".to_string());
            args.push("x".to_string());
        }
        args.push(self.target.clone());
        args
    }
}

/// The sole write path to disk geometry.
pub trait GeomControl {
    /// Issues one request. Failures carry the tool's diagnostic text.
    fn issue(&self, request: &PartRequest) -> Result<(), InstallerError>;
}

impl<T: GeomControl + ?Sized> GeomControl for &T {
    fn issue(&self, request: &PartRequest) -> Result<(), InstallerError> {
        (**self).issue(request)
    }
}

/// Drives the live system through `gpart(8)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Gpart;

impl GeomControl for Gpart {
    fn issue(&self, request: &PartRequest) -> Result<(), InstallerError> {
        let args = request.to_gpart_args();
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        info!("gpart {} {}", request.verb, request.target);
        cmd::run_diagnostic("gpart", &args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_request_maps_to_staged_gpart_call() {
        let req = PartRequest::new(PartVerb::Add, "ada0")
            .param("label", "rootfs")
            .param("type", "freebsd-ufs")
            .param("start", 1064)
            .param("size", 2048);
        assert_eq!(
            req.to_gpart_args(),
            vec![
                "add", "-l", "rootfs", "-t", "freebsd-ufs", "-b", "1064", "-s", "2048", "-f", "x",
                "ada0"
            ]
        );
    }

    #[test]
    fn commit_and_undo_are_not_staged() {
        let req = PartRequest::new(PartVerb::Commit, "ada0");
        assert!(!req.staged);
        assert_eq!(req.to_gpart_args(), vec!["commit", "ada0"]);

        let req = PartRequest::new(PartVerb::Undo, "ada0");
        assert_eq!(req.to_gpart_args(), vec!["undo", "ada0"]);
    }

    #[test]
    fn create_and_delete_arguments() {
        let req = PartRequest::new(PartVerb::Create, "ada1").param("scheme", "GPT");
        assert_eq!(req.to_gpart_args(), vec!["create", "-s", "GPT", "-f", "x", "ada1"]);
        assert_eq!(req.get("scheme"), Some("GPT"));

        let req = PartRequest::new(PartVerb::Delete, "ada0").param("index", 3);
        assert_eq!(req.to_gpart_args(), vec!["delete", "-i", "3", "-f", "x", "ada0"]);
    }
}
