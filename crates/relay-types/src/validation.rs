//! Schema checks for implementation configuration tables.
//!
//! Each pluggable implementation validates its `implementations.<name>`
//! table against a [`Schema`] before reading values out of it, so a typo in
//! the TOML surfaces as a named field error instead of a silent default.

use thiserror::Error;

/// Errors raised by schema validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
	#[error("Missing required field: {0}")]
	MissingField(String),
	#[error("Invalid value for field '{field}': {message}")]
	InvalidValue { field: String, message: String },
	#[error("Type mismatch for field '{field}': expected {expected}, got {actual}")]
	TypeMismatch {
		field: String,
		expected: &'static str,
		actual: String,
	},
}

/// Expected type of a configuration field.
#[derive(Debug, Clone, Copy)]
pub enum FieldType {
	String,
	/// Integer with optional inclusive bounds.
	Integer { min: Option<i64>, max: Option<i64> },
	Boolean,
}

impl FieldType {
	fn name(&self) -> &'static str {
		match self {
			FieldType::String => "string",
			FieldType::Integer { .. } => "integer",
			FieldType::Boolean => "boolean",
		}
	}
}

type FieldValidator = Box<dyn Fn(&toml::Value) -> Result<(), String> + Send + Sync>;

/// One named field of a schema.
pub struct Field {
	pub name: String,
	pub field_type: FieldType,
	validator: Option<FieldValidator>,
}

impl std::fmt::Debug for Field {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Field")
			.field("name", &self.name)
			.field("field_type", &self.field_type)
			.field("validator", &self.validator.is_some())
			.finish()
	}
}

impl Field {
	pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
		Self {
			name: name.into(),
			field_type,
			validator: None,
		}
	}

	/// Adds a check run after the type check passes.
	pub fn with_validator<F>(mut self, validator: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<(), String> + Send + Sync + 'static,
	{
		self.validator = Some(Box::new(validator));
		self
	}

	fn check(&self, value: &toml::Value) -> Result<(), ValidationError> {
		let mismatch = || ValidationError::TypeMismatch {
			field: self.name.clone(),
			expected: self.field_type.name(),
			actual: value.type_str().to_string(),
		};

		match self.field_type {
			FieldType::String if !value.is_str() => return Err(mismatch()),
			FieldType::Boolean if !value.is_bool() => return Err(mismatch()),
			FieldType::Integer { min, max } => {
				let n = value.as_integer().ok_or_else(mismatch)?;
				if let Some(min) = min.filter(|min| n < *min) {
					return Err(self.invalid(format!("{} is below the minimum {}", n, min)));
				}
				if let Some(max) = max.filter(|max| n > *max) {
					return Err(self.invalid(format!("{} is above the maximum {}", n, max)));
				}
			},
			_ => {},
		}

		match &self.validator {
			Some(validator) => validator(value).map_err(|message| self.invalid(message)),
			None => Ok(()),
		}
	}

	fn invalid(&self, message: String) -> ValidationError {
		ValidationError::InvalidValue {
			field: self.name.clone(),
			message,
		}
	}
}

/// Required and optional fields of one implementation table.
#[derive(Debug)]
pub struct Schema {
	pub required: Vec<Field>,
	pub optional: Vec<Field>,
}

impl Schema {
	pub fn new(required: Vec<Field>, optional: Vec<Field>) -> Self {
		Self { required, optional }
	}

	/// Checks that `config` is a table holding every required field, and
	/// that every present field has the expected type and passes its check.
	/// Unknown keys are ignored.
	pub fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let table = config
			.as_table()
			.ok_or_else(|| ValidationError::TypeMismatch {
				field: "root".to_string(),
				expected: "table",
				actual: config.type_str().to_string(),
			})?;

		for field in &self.required {
			let value = table
				.get(&field.name)
				.ok_or_else(|| ValidationError::MissingField(field.name.clone()))?;
			field.check(value)?;
		}
		for field in &self.optional {
			if let Some(value) = table.get(&field.name) {
				field.check(value)?;
			}
		}

		Ok(())
	}
}

/// Implemented by the schema type of each pluggable implementation.
pub trait ConfigSchema: Send + Sync {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError>;
}
