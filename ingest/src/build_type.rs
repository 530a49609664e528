use benchlog_store::build;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, trace};

pub const BUILD_TYPE_VARIABLE: &str = "BUILD_TYPE";
pub const BUILD_INFO_PATH: &str = "/app/.build_info";
const BUILD_INFO_KEY: &str = "BUILD_TYPE=";

/// Decides which build label a run is tagged with.
///
/// Precedence: the `BUILD_TYPE` value, then the first `BUILD_TYPE=` line of the
/// build info file, then `Release`. Both sources are captured up front so the
/// resolver can be built by hand in tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildTypeResolver {
    variable: Option<String>,
    build_info: Option<PathBuf>,
}

impl Default for BuildTypeResolver {
    fn default() -> Self {
        Self::from_env()
    }
}

impl BuildTypeResolver {
    pub fn new(variable: Option<String>, build_info: Option<PathBuf>) -> Self {
        Self {
            variable,
            build_info,
        }
    }

    /// `BUILD_TYPE` from the process environment and the usual build info file
    pub fn from_env() -> Self {
        Self::new(
            std::env::var(BUILD_TYPE_VARIABLE).ok(),
            Some(PathBuf::from(BUILD_INFO_PATH)),
        )
    }

    /// always resolves to `label`
    pub fn fixed(label: impl Into<String>) -> Self {
        Self::new(Some(label.into()), None)
    }

    pub fn resolve(&self) -> String {
        if let Some(label) = self.variable.as_deref().map(str::trim) {
            if !label.is_empty() {
                trace!(label = label, "Build type from {BUILD_TYPE_VARIABLE}");
                return label.to_owned();
            }
        }

        if let Some(label) = self.build_info.as_deref().and_then(read_build_info) {
            return label;
        }

        build::RELEASE.to_owned()
    }
}

fn read_build_info(path: &Path) -> Option<String> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(error) => {
            trace!(error = ?error, path = %path.display(), "No build info file");
            return None;
        }
    };

    let label = content
        .lines()
        .find_map(|line| line.strip_prefix(BUILD_INFO_KEY))
        .map(str::trim)
        .filter(|label| !label.is_empty())?;

    debug!(label = label, path = %path.display(), "Build type from build info");

    Some(label.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn build_info(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn variable_wins() {
        let file = build_info("BUILD_TYPE=Debug\n");
        let resolver = BuildTypeResolver::new(Some("RelWithDebInfo".into()), Some(file.path().into()));

        assert_eq!(resolver.resolve(), "RelWithDebInfo");
    }

    #[test]
    fn build_info_when_variable_missing_or_blank() {
        let file = build_info("COMPILER=clang\nBUILD_TYPE=Debug\nBUILD_TYPE=Release\n");

        assert_eq!(
            BuildTypeResolver::new(None, Some(file.path().into())).resolve(),
            "Debug"
        );
        assert_eq!(
            BuildTypeResolver::new(Some("  ".into()), Some(file.path().into())).resolve(),
            "Debug"
        );
    }

    #[test]
    fn falls_back_to_release() {
        let file = build_info("COMPILER=gcc\n");

        assert_eq!(
            BuildTypeResolver::new(None, Some(file.path().into())).resolve(),
            build::RELEASE
        );
        assert_eq!(
            BuildTypeResolver::new(None, Some("/definitely/missing/.build_info".into())).resolve(),
            build::RELEASE
        );
        assert_eq!(BuildTypeResolver::new(None, None).resolve(), build::RELEASE);
    }
}
