//! Multi-file configuration loading.
//!
//! A file may name other files in a top-level `include` key (a string or an
//! array of strings, relative to the including file). Included files may
//! include further files. The tables are merged at the top level only, so
//! a section defined twice is an error rather than a silent override.

use crate::{resolve_env_vars, Config, ConfigError};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

pub(crate) struct ConfigLoader {
	base_dir: PathBuf,
	/// Canonical paths already read, for cycle detection.
	visited: HashSet<PathBuf>,
	/// Top-level section name to the file that defined it.
	owners: HashMap<String, PathBuf>,
}

impl ConfigLoader {
	pub(crate) fn new(base_dir: impl AsRef<Path>) -> Self {
		Self {
			base_dir: base_dir.as_ref().to_path_buf(),
			visited: HashSet::new(),
			owners: HashMap::new(),
		}
	}

	/// Loads `path` (relative to the base directory) with all its includes
	/// and validates the merged result.
	pub(crate) async fn load_config(&mut self, path: impl AsRef<Path>) -> Result<Config, ConfigError> {
		let root = self.base_dir.join(path.as_ref());
		let mut merged = toml::Table::new();
		let mut pending = vec![root];

		while let Some(file) = pending.pop() {
			let mut table = self.read_table(&file).await?;
			let includes = extract_includes(&mut table)?;
			let dir = file.parent().map(Path::to_path_buf).unwrap_or_default();

			for (section, value) in table {
				if let Some(owner) = self.owners.get(&section) {
					return Err(ConfigError::Validation(format!(
						"Duplicate section '{}' found in {} and {}",
						section,
						owner.display(),
						file.display()
					)));
				}
				self.owners.insert(section.clone(), file.clone());
				merged.insert(section, value);
			}

			// Reverse so includes are visited in declaration order.
			pending.extend(includes.into_iter().rev().map(|p| dir.join(p)));
		}

		let rendered = toml::to_string(&merged)
			.map_err(|e| ConfigError::Parse(format!("Failed to render merged config: {}", e)))?;
		// Variables were already resolved per file; this parse only validates.
		rendered.parse()
	}

	async fn read_table(&mut self, path: &Path) -> Result<toml::Table, ConfigError> {
		let canonical = tokio::fs::canonicalize(path).await.map_err(|e| {
			ConfigError::Io(std::io::Error::new(
				e.kind(),
				format!("Cannot resolve path {}: {}", path.display(), e),
			))
		})?;

		if !self.visited.insert(canonical.clone()) {
			return Err(ConfigError::Validation(format!(
				"Circular include detected: {} was already loaded",
				canonical.display()
			)));
		}

		let content = tokio::fs::read_to_string(&canonical).await?;
		let resolved = resolve_env_vars(&content)?;
		Ok(toml::from_str(&resolved)?)
	}
}

fn extract_includes(table: &mut toml::Table) -> Result<Vec<PathBuf>, ConfigError> {
	match table.remove("include") {
		None => Ok(Vec::new()),
		Some(toml::Value::String(path)) => Ok(vec![PathBuf::from(path)]),
		Some(toml::Value::Array(items)) => items
			.into_iter()
			.map(|item| match item {
				toml::Value::String(path) => Ok(PathBuf::from(path)),
				_ => Err(ConfigError::Validation(
					"Include array must contain only strings".into(),
				)),
			})
			.collect(),
		Some(_) => Err(ConfigError::Validation(
			"Include must be a string or array of strings".into(),
		)),
	}
}
