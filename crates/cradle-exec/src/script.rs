//! Binary-safe script transport.
//!
//! Scripts cross several quoting boundaries on their way into a container
//! (local shell, ssh, docker run/exec). Encoding them as base64 and
//! decoding inside the container sidesteps every one of them; the decoder
//! is the runner script the catalog installs into every image.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use cradle_common::constants::RUNNER_PATH;

/// Encodes a script for embedding in a remote command line.
#[must_use]
pub fn encode_script(script: &str) -> String {
    STANDARD.encode(script.as_bytes())
}

/// Builds the in-container invocation that decodes and executes `script`
/// through the installed runner.
#[must_use]
pub fn runner_invocation(script: &str) -> String {
    format!("bash {RUNNER_PATH} {}", encode_script(script))
}

/// Joins init commands and the user script into the single program the
/// runner executes.
#[must_use]
pub fn compose_script(init_commands: &[String], script: &str) -> String {
    let mut full = String::new();
    for command in init_commands {
        full.push_str(command);
        full.push('\n');
    }
    full.push_str(script);
    full.push('\n');
    full
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoding_is_plain_base64() {
        assert_eq!(encode_script("echo hello"), "ZWNobyBoZWxsbw==");
    }

    #[test]
    fn invocation_targets_the_installed_runner() {
        let invocation = runner_invocation("echo hi");
        assert!(invocation.starts_with(&format!("bash {RUNNER_PATH} ")));
        // The payload is a single base64 token, safe under shell quoting.
        let payload = invocation.rsplit(' ').next().expect("payload");
        assert!(
            payload
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '='))
        );
    }

    #[test]
    fn init_commands_run_before_the_script() {
        let full = compose_script(
            &["cd /sources/demo".to_owned(), "uv sync".to_owned()],
            "echo hello",
        );
        assert_eq!(full, "cd /sources/demo\nuv sync\necho hello\n");
    }

    #[test]
    fn quoting_hostile_content_is_preserved() {
        let hostile = r#"echo "it's a 'test'" && cat <<'EOF'
$DOLLAR `backtick`
EOF"#;
        let encoded = encode_script(hostile);
        let decoded = STANDARD.decode(encoded).expect("decode");
        assert_eq!(String::from_utf8(decoded).expect("utf8"), hostile);
    }
}
