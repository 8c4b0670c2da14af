use anyhow::anyhow;

/// A path inside a named container, written as `NAME:PATH` on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerPath {
    pub container: String,
    pub path: String,
}

impl std::fmt::Display for ContainerPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.container, self.path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathType {
    Stdio,
    Container(ContainerPath),
    Local(std::path::PathBuf),
}

/// Works out which kind of endpoint `path` names.
///
/// Tried in order: `-` is stdio, `NAME:PATH` (NAME made of letters, digits, `_` and `-`) is a
/// container path, anything else is a local path.
pub fn parse_path(path: &str) -> anyhow::Result<PathType> {
    if path.is_empty() {
        return Err(anyhow!("Path cannot be empty"));
    }
    if path == "-" {
        return Ok(PathType::Stdio);
    }
    let re = regex::Regex::new(r"^(?P<container>[A-Za-z0-9_-]+):(?P<path>.*)$")?;
    if let Some(captures) = re.captures(path) {
        let container = &captures["container"];
        let container_path = &captures["path"];
        if container_path.is_empty() {
            return Err(anyhow!(
                "Path inside container {container:?} cannot be empty.\n\
                Use '{container}:/' to refer to the container's root directory"
            ));
        }
        return Ok(PathType::Container(ContainerPath {
            container: container.to_string(),
            path: container_path.to_string(),
        }));
    }
    Ok(PathType::Local(path.into()))
}
