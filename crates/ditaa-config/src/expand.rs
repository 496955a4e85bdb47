//! `${VAR}` and `${VAR:-default}` expansion for configuration values.

use std::env::{self, VarError};

use crate::ConfigError;

/// Expand `${VAR}` references in `value` in place.
///
/// Values without `${` are left alone, so a bare `$` in a tool command
/// survives. Once a value does contain `${`, bare `$VAR` references in it are
/// expanded as well.
pub(crate) fn expand_in_place(value: &mut String, field: &str) -> Result<(), ConfigError> {
    if !value.contains("${") {
        return Ok(());
    }
    let lookup = |name: &str| env::var(name).map(Some);
    let expanded = shellexpand::env_with_context(value.as_str(), lookup)
        .map_err(|e| ConfigError::EnvVar {
            field: field.to_owned(),
            message: match e.cause {
                VarError::NotPresent => format!("${{{}}} not set", e.var_name),
                VarError::NotUnicode(_) => format!("${{{}}} is not valid UTF-8", e.var_name),
            },
        })?
        .into_owned();
    *value = expanded;
    Ok(())
}

/// [`expand_in_place`] for optional fields.
pub(crate) fn expand_optional(value: &mut Option<String>, field: &str) -> Result<(), ConfigError> {
    match value {
        Some(value) => expand_in_place(value, field),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn expand(value: &str, field: &str) -> Result<String, ConfigError> {
        let mut value = value.to_owned();
        expand_in_place(&mut value, field)?;
        Ok(value)
    }

    #[test]
    fn test_tool_path_from_environment() {
        // SAFETY: test runs single-threaded per test function
        unsafe {
            env::set_var("DITAA_TEST_HOME", "/opt/ditaa");
        }
        assert_eq!(
            expand("${DITAA_TEST_HOME}/bin/ditaa", "tool.command").unwrap(),
            "/opt/ditaa/bin/ditaa"
        );
        unsafe {
            env::remove_var("DITAA_TEST_HOME");
        }
    }

    #[test]
    fn test_default_used_when_unset() {
        // SAFETY: test runs single-threaded per test function
        unsafe {
            env::remove_var("DITAA_TEST_UNSET");
        }
        assert_eq!(
            expand("${DITAA_TEST_UNSET:-ditaa}", "tool.command").unwrap(),
            "ditaa"
        );
    }

    #[test]
    fn test_unset_variable_names_field() {
        // SAFETY: test runs single-threaded per test function
        unsafe {
            env::remove_var("DITAA_TEST_MISSING");
        }
        let err = expand("${DITAA_TEST_MISSING}", "build.cache_dir").unwrap_err();

        assert_eq!(
            err.to_string(),
            "Environment variable error in build.cache_dir: ${DITAA_TEST_MISSING} not set"
        );
    }

    #[test]
    fn test_bare_dollar_kept() {
        assert_eq!(
            expand("java -jar $JAR", "tool.command").unwrap(),
            "java -jar $JAR"
        );
    }

    #[test]
    fn test_optional_none_untouched() {
        let mut value = None;
        expand_optional(&mut value, "defaults.encoding").unwrap();
        assert_eq!(value, None);
    }
}
