//! HCL templates for the iterative terraform provider.
use std::fmt::Write;

use cirun_model::RunnerConfig;

use crate::InfraError;

pub const MAIN_FILE: &str = "main.tf";

/// Provider block only; the resource to destroy is injected into the state afterwards.
pub fn render_local_destroy(tpi_version: &str) -> String {
    format!(
        r#"{header}

provider "iterative" {{}}
"#,
        header = provider_header(tpi_version)
    )
}

/// Instance running this agent in local mode, configured like the caller.
pub fn render_cloud_runner(config: &RunnerConfig) -> Result<String, InfraError> {
    let cloud = config.cloud.as_ref().ok_or(InfraError::NotCloud)?;

    let mut body = String::new();
    let mut attr = |key: &str, value: String| {
        let _ = writeln!(body, "  {key} = {value}");
    };

    attr("repo", hcl_string(&config.repo));
    attr("token", hcl_string(&config.token));
    attr("driver", hcl_string(config.driver.as_str()));
    attr("labels", hcl_string(&config.labels.joined()));
    attr("cml_version", hcl_string(&config.runner_version));
    attr("idle_timeout", config.idle_timeout.as_secs().to_string());
    attr("name", hcl_string(&config.name));
    attr("single", config.single.to_string());
    attr("cloud", hcl_string(cloud.provider.as_str()));
    attr("region", hcl_string(&cloud.region));
    if let Some(t) = &cloud.instance_type {
        attr("instance_type", hcl_string(t));
    }
    if !cloud.permission_set.is_empty() {
        attr("instance_permission_set", hcl_string(&cloud.permission_set));
    }
    if let Some(gpu) = &cloud.gpu {
        attr("instance_gpu", hcl_string(gpu));
    }
    if let Some(size) = cloud.hdd_size {
        attr("instance_hdd_size", size.to_string());
    }
    if let Some(key) = &cloud.ssh_private {
        attr("ssh_private", hcl_string(key));
    }
    if cloud.spot {
        attr("spot", "true".to_string());
        attr("spot_price", cloud.spot_price.to_string());
    }
    if let Some(script) = &cloud.startup_script {
        attr("startup_script", hcl_string(script));
    }
    if !cloud.aws_security_group.is_empty() {
        attr("aws_security_group", hcl_string(&cloud.aws_security_group));
    }
    if !cloud.aws_subnet.is_empty() {
        attr("aws_subnet_id", hcl_string(&cloud.aws_subnet));
    }
    if !config.docker_volumes.is_empty() {
        let volumes: Vec<String> = config.docker_volumes.iter().map(|v| hcl_string(v)).collect();
        attr("docker_volumes", format!("[{}]", volumes.join(", ")));
    }
    if !cloud.metadata.is_empty() {
        let pairs: Vec<String> = cloud
            .metadata
            .iter()
            .map(|(k, v)| format!("{} = {}", hcl_string(k), hcl_string(v)))
            .collect();
        attr("metadata", format!("{{ {} }}", pairs.join(", ")));
    }

    Ok(format!(
        r#"{header}

provider "iterative" {{}}

resource "iterative_cml_runner" "runner" {{
{body}}}
"#,
        header = provider_header(&config.tpi_version)
    ))
}

fn provider_header(tpi_version: &str) -> String {
    format!(
        r#"terraform {{
  required_providers {{
    iterative = {{
      source  = "iterative/iterative"
      version = {version}
    }}
  }}
}}"#,
        version = hcl_string(tpi_version)
    )
}

/// Quoted HCL string literal with template sequences neutralised.
fn hcl_string(raw: &str) -> String {
    // JSON string escaping is a subset of HCL's
    let quoted = serde_json::Value::String(raw.to_string()).to_string();
    quoted.replace("${", "$${").replace("%{", "%%{")
}

#[cfg(test)]
mod tests {
    use std::{path::PathBuf, time::Duration};

    use cirun_model::{CloudConfig, CloudProvider, Driver, RunnerLabels};

    use super::*;

    fn config() -> RunnerConfig {
        let mut cloud = CloudConfig::new(CloudProvider::Aws);
        cloud.instance_type = Some("m".into());
        cloud.metadata.insert("team".into(), "ml".into());
        RunnerConfig {
            name: "cirun-abc".into(),
            labels: RunnerLabels::parse("cml,gpu"),
            driver: Driver::Github,
            repo: "https://github.com/org/repo".into(),
            token: "tok\"en".into(),
            idle_timeout: Duration::from_secs(300),
            single: true,
            reuse: false,
            reuse_idle: false,
            no_retry: false,
            workdir: PathBuf::from("/tmp/x"),
            docker_volumes: vec!["/data:/data".into()],
            cloud: Some(cloud),
            tf_resource: None,
            tpi_version: ">= 0.9.10".into(),
            runner_version: "0.0.1".into(),
            destroy_delay: Duration::from_secs(10),
        }
    }

    #[test]
    fn escapes_strings() {
        assert_eq!(hcl_string("a\"b"), r#""a\"b""#);
        assert_eq!(hcl_string("line\nbreak"), r#""line\nbreak""#);
        assert_eq!(hcl_string("${var.x}"), r#""$${var.x}""#);
    }

    #[test]
    fn local_template_declares_only_provider() {
        let tpl = render_local_destroy("= 0.10.4");
        assert!(tpl.contains(r#"version = "= 0.10.4""#));
        assert!(tpl.contains(r#"provider "iterative" {}"#));
        assert!(!tpl.contains("resource"));
    }

    #[test]
    fn cloud_template_contains_runner_resource() {
        let tpl = render_cloud_runner(&config()).unwrap();
        assert!(tpl.contains(r#"resource "iterative_cml_runner" "runner" {"#));
        assert!(tpl.contains(r#"  token = "tok\"en""#));
        assert!(tpl.contains("  idle_timeout = 300"));
        assert!(tpl.contains("  single = true"));
        assert!(tpl.contains(r#"  cloud = "aws""#));
        assert!(tpl.contains(r#"  instance_type = "m""#));
        assert!(tpl.contains(r#"  docker_volumes = ["/data:/data"]"#));
        assert!(tpl.contains(r#"  metadata = { "team" = "ml" }"#));
        assert!(!tpl.contains("spot_price"));
        assert!(tpl.trim_end().ends_with('}'));
    }

    #[test]
    fn cloud_template_requires_cloud() {
        let mut cfg = config();
        cfg.cloud = None;
        assert!(matches!(render_cloud_runner(&cfg), Err(InfraError::NotCloud)));
    }
}
