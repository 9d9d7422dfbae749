//! Boot-time script handed to the instance as cloud-init user data. The
//! script runs as root on first boot, configures the actions-runner agent
//! with the one-time registration token and starts it. The orchestrator only
//! builds the text; it never executes it.

const RUNNER_VERSION: &str = "2.319.1";

pub fn build_user_data(
    owner: &str,
    repo: &str,
    registration_token: &str,
    label: &str,
    home_dir: Option<&str>,
) -> String {
    let register_and_run = [
        "export RUNNER_ALLOW_RUNASROOT=1".to_string(),
        "export DOTNET_SYSTEM_GLOBALIZATION_INVARIANT=1".to_string(),
        "export DOTNET_SYSTEM_GLOBALIZATION_PREDEFINED_CULTURES_ONLY=false".to_string(),
        format!(
            "./config.sh --url https://github.com/{}/{} --token {} --name {} --labels {} --unattended",
            owner, repo, registration_token, label, label
        ),
        "./run.sh".to_string(),
    ];

    let mut lines = vec!["#!/bin/bash".to_string()];
    match home_dir {
        // Runner software pre-installed in the image: just cd and start.
        Some(dir) => {
            lines.push(format!("cd \"{}\"", dir));
        }
        None => {
            lines.push("mkdir actions-runner && cd actions-runner".to_string());
            lines.push(
                "case $(uname -m) in aarch64) ARCH=\"arm64\" ;; amd64|x86_64) ARCH=\"x64\" ;; esac && export RUNNER_ARCH=${ARCH}"
                    .to_string(),
            );
            lines.push(format!(
                "curl -O -L https://github.com/actions/runner/releases/download/v{v}/actions-runner-linux-${{RUNNER_ARCH}}-{v}.tar.gz",
                v = RUNNER_VERSION
            ));
            lines.push(format!(
                "tar xzf ./actions-runner-linux-${{RUNNER_ARCH}}-{}.tar.gz",
                RUNNER_VERSION
            ));
        }
    }
    lines.extend(register_and_run);
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preinstalled_variant_skips_download() {
        let script = build_user_data("acme", "widgets", "tok-123", "runner-a", Some("/opt/runner"));
        assert!(script.starts_with("#!/bin/bash"));
        assert!(script.contains("cd \"/opt/runner\""));
        assert!(!script.contains("curl"));
        assert!(script.contains("--token tok-123"));
        assert!(script.contains("--name runner-a --labels runner-a"));
        assert!(script.contains("https://github.com/acme/widgets"));
    }

    #[test]
    fn download_variant_fetches_the_release() {
        let script = build_user_data("acme", "widgets", "tok-123", "runner-a", None);
        assert!(script.contains("mkdir actions-runner"));
        assert!(script.contains("curl -O -L"));
        assert!(script.contains(RUNNER_VERSION));
        assert!(script.contains("./run.sh"));
    }
}
