//! Version templates.
//!
//! Templates use `{{name}}` actions where `name` is one of:
//! - `{{auto}}` - the repository's autoincrement counter
//! - `{{branch}}` - the pushed branch
//! - `{{revision}}` - the pushed revision
//!
//! Everything outside an action is copied verbatim.

use hoist_core::manifest::{VersionParams, VersionStrategy};
use regex::Regex;
use std::sync::LazyLock;

use crate::TemplateError;

static ACTION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{\{(.*?)\}\}").unwrap());

/// Evaluate a single template against `params`.
pub fn render(template: &str, params: &VersionParams) -> Result<String, TemplateError> {
    let mut output = String::with_capacity(template.len());
    let mut last = 0;

    for caps in ACTION_REGEX.captures_iter(template) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        let literal = &template[last..whole.start()];
        if literal.contains("{{") {
            return Err(TemplateError::UnclosedAction);
        }
        output.push_str(literal);
        output.push_str(&call(&caps[1], params)?);
        last = whole.end();
    }

    let tail = &template[last..];
    if tail.contains("{{") {
        return Err(TemplateError::UnclosedAction);
    }
    output.push_str(tail);

    Ok(output)
}

fn call(action: &str, params: &VersionParams) -> Result<String, TemplateError> {
    let mut words = action.split_whitespace();
    let Some(name) = words.next() else {
        return Err(TemplateError::EmptyAction);
    };

    let args = words.count();
    let value = match name {
        "auto" => params.auto_increment.to_string(),
        "branch" => params.branch.clone(),
        "revision" => params.revision.clone(),
        _ => return Err(TemplateError::UnknownFunction(name.to_string())),
    };
    if args > 0 {
        return Err(TemplateError::UnexpectedArguments {
            name: name.to_string(),
            got: args,
        });
    }

    Ok(value)
}

// Template failures become the rendered text.
fn render_or_error(template: &str, params: &VersionParams) -> String {
    render(template, params).unwrap_or_else(|e| e.to_string())
}

/// Compute the version string for a build.
///
/// Never fails: a broken template renders as its error message, so a
/// returned string is not proof the template was valid. Use
/// [`try_version`] when the distinction matters.
pub fn version(strategy: &VersionStrategy, params: &VersionParams) -> String {
    match strategy {
        VersionStrategy::Custom(custom) => render_or_error(&custom.label_template, params),
        VersionStrategy::Semver(semver) => {
            let patch = render_or_error(&semver.patch, params);
            let label = if params.branch == semver.release_branch {
                String::new()
            } else {
                format!("-{}", render_or_error(&semver.label_template, params))
            };
            format!("{}.{}.{}{}", semver.major, semver.minor, patch, label)
        }
    }
}

/// Like [`version`], but surfaces the first template error.
pub fn try_version(
    strategy: &VersionStrategy,
    params: &VersionParams,
) -> Result<String, TemplateError> {
    match strategy {
        VersionStrategy::Custom(custom) => render(&custom.label_template, params),
        VersionStrategy::Semver(semver) => {
            let patch = render(&semver.patch, params)?;
            let label = if params.branch == semver.release_branch {
                String::new()
            } else {
                format!("-{}", render(&semver.label_template, params)?)
            };
            Ok(format!("{}.{}.{}{}", semver.major, semver.minor, patch, label))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoist_core::manifest::{CustomVersion, SemverVersion};

    fn params() -> VersionParams {
        VersionParams {
            auto_increment: 7,
            branch: "feature-x".to_string(),
            revision: "abc123".to_string(),
        }
    }

    fn semver(major: i64, minor: i64) -> VersionStrategy {
        VersionStrategy::Semver(SemverVersion {
            major,
            minor,
            ..SemverVersion::default()
        })
    }

    #[test]
    fn test_render_functions() {
        assert_eq!(
            render("{{branch}}-{{revision}}-{{auto}}", &params()).unwrap(),
            "feature-x-abc123-7"
        );
    }

    #[test]
    fn test_render_allows_whitespace_in_actions() {
        assert_eq!(render("v{{ auto }}", &params()).unwrap(), "v7");
    }

    #[test]
    fn test_render_plain_text() {
        assert_eq!(render("1.0.0", &params()).unwrap(), "1.0.0");
    }

    #[test]
    fn test_render_unknown_function() {
        assert_eq!(
            render("{{tag}}", &params()).unwrap_err(),
            TemplateError::UnknownFunction("tag".to_string())
        );
    }

    #[test]
    fn test_render_unclosed_action() {
        assert_eq!(
            render("{{branch", &params()).unwrap_err(),
            TemplateError::UnclosedAction
        );
        assert_eq!(
            render("{{branch {{auto}}", &params()).unwrap_err(),
            TemplateError::UnexpectedArguments {
                name: "branch".to_string(),
                got: 1
            }
        );
    }

    #[test]
    fn test_render_empty_action() {
        assert_eq!(
            render("{{ }}", &params()).unwrap_err(),
            TemplateError::EmptyAction
        );
    }

    #[test]
    fn test_custom_version() {
        let strategy = VersionStrategy::Custom(CustomVersion::default());
        assert_eq!(version(&strategy, &params()), "abc123");
    }

    #[test]
    fn test_semver_on_feature_branch() {
        assert_eq!(version(&semver(1, 2), &params()), "1.2.7-feature-x");
    }

    #[test]
    fn test_semver_on_release_branch() {
        let mut p = params();
        p.branch = "master".to_string();
        assert_eq!(version(&semver(1, 2), &p), "1.2.7");
    }

    #[test]
    fn test_broken_template_renders_error_text() {
        let strategy = VersionStrategy::Custom(CustomVersion {
            label_template: "{{nope}}".to_string(),
        });
        let rendered = version(&strategy, &params());
        assert_eq!(rendered, "template: version: function \"nope\" not defined");
        assert!(try_version(&strategy, &params()).is_err());
    }

    #[test]
    fn test_semver_with_broken_label_keeps_numbers() {
        let strategy = VersionStrategy::Semver(SemverVersion {
            major: 3,
            minor: 1,
            label_template: "{{".to_string(),
            ..SemverVersion::default()
        });
        assert_eq!(
            version(&strategy, &params()),
            "3.1.7-template: version: unclosed action"
        );
        assert_eq!(
            try_version(&strategy, &params()).unwrap_err(),
            TemplateError::UnclosedAction
        );
    }
}
