//! `buch-lasttest plan` command implementation.

use anyhow::Result;
use std::path::PathBuf;

use buch_lasttest::loadtest::config::LoadTestConfig;

use super::run::load_profile;

/// Execute the `plan` command: print the resolved profile and its expected rates.
pub fn execute_plan(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_profile(config_path)?;
    println!("{}", render_plan(&config));
    Ok(())
}

fn render_plan(config: &LoadTestConfig) -> String {
    let settings = &config.settings;
    let mut lines = vec![
        format!("users:                {}", settings.users),
        format!("throughput per user:  {} it/s", settings.throughput_per_user),
        format!("duration:             {}s", settings.duration_secs),
        format!(
            "spawn rate:           {}",
            settings
                .spawn_rate
                .map(|r| format!("{r} users/s"))
                .unwrap_or_else(|| "all at once".to_string())
        ),
        format!(
            "tls verification:     {}",
            if settings.accept_invalid_certs { "disabled" } else { "enabled" }
        ),
        String::new(),
        format!(
            "  {:<12} {:>7} {:>8} {:>9}  {}",
            "task", "weight", "share", "requests", "template"
        ),
    ];

    for task in &config.task {
        let template = match &task.query {
            Some(param) => format!("{}?{param}=...", task.path),
            None => task.path.clone(),
        };
        lines.push(format!(
            "  {:<12} {:>7} {:>8} {:>9}  {}",
            task.name,
            task.weight,
            format!("{:.1}%", config.expected_share(task) * 100.0),
            task.values.len(),
            template
        ));
    }

    lines.push(String::new());
    lines.push(format!(
        "expected iterations:  {:.1} it/s",
        config.expected_iteration_rate()
    ));
    lines.push(format!(
        "requests/iteration:   {:.2}",
        config.mean_requests_per_iteration()
    ));
    lines.push(format!(
        "expected requests:    {:.1} req/s",
        config.expected_request_rate()
    ));

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_plan_builtin_profile() {
        let plan = render_plan(&LoadTestConfig::buch_profile());

        assert!(plan.contains("users:                500"), "got: {plan}");
        assert!(plan.contains("all at once"));
        assert!(plan.contains("tls verification:     disabled"));
        assert!(plan.contains("/rest?titel=..."));
        assert!(plan.contains("44.4%"), "get_titel share, got: {plan}");
        assert!(plan.contains("expected iterations:  50.0 it/s"));
        assert!(plan.contains("requests/iteration:   5.56"));
        assert!(plan.contains("expected requests:    277.8 req/s"));
    }

    #[test]
    fn test_render_plan_spawn_rate() {
        let mut config = LoadTestConfig::buch_profile();
        config.settings.spawn_rate = Some(20.0);
        assert!(render_plan(&config).contains("20 users/s"));
    }
}
