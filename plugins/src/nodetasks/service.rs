use async_trait::async_trait;

use nodeup_core::api::{argv, Change, CheckOutcome, NodeTask, TaskContext, TaskError, TaskKey};

use super::shell_quote;

/// A systemd unit that should be enabled and running.
#[derive(Debug, Clone)]
pub struct ServiceTask {
    name: String,
    deps: Vec<TaskKey>,
}

impl ServiceTask {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            deps: Vec::new(),
        }
    }

    pub fn after(mut self, deps: impl IntoIterator<Item = TaskKey>) -> Self {
        self.deps.extend(deps);
        self
    }

    pub fn key_for(name: &str) -> TaskKey {
        TaskKey::new(format!("service:{name}"))
    }

    pub fn key(&self) -> TaskKey {
        Self::key_for(&self.name)
    }

    async fn systemctl_state(&self, ctx: &TaskContext, verb: &str) -> Result<String, TaskError> {
        let output = ctx
            .host
            .query(&argv(&["systemctl", verb, self.name.as_str()]))
            .await?;
        let state = output.stdout.trim();
        Ok(if state.is_empty() {
            "unknown".to_string()
        } else {
            state.to_string()
        })
    }
}

#[async_trait]
impl NodeTask for ServiceTask {
    fn kind(&self) -> &'static str {
        "Service"
    }

    fn dependencies(&self) -> Vec<TaskKey> {
        self.deps.clone()
    }

    fn desired(&self) -> Vec<Change> {
        vec![
            Change::create("enabled", "enabled"),
            Change::create("active", "active"),
        ]
    }

    async fn check(&self, ctx: &TaskContext) -> Result<CheckOutcome, TaskError> {
        let enabled = self.systemctl_state(ctx, "is-enabled").await?;
        let active = self.systemctl_state(ctx, "is-active").await?;

        let mut changes = Vec::new();
        if enabled != "enabled" {
            changes.push(Change::new("enabled", Some(enabled), "enabled"));
        }
        if active != "active" {
            changes.push(Change::new("active", Some(active), "active"));
        }
        Ok(CheckOutcome::from_changes(changes))
    }

    async fn apply(&self, ctx: &TaskContext) -> Result<(), TaskError> {
        ctx.host.run(&argv(&["systemctl", "daemon-reload"])).await?;
        ctx.host
            .run(&argv(&["systemctl", "enable", "--now", self.name.as_str()]))
            .await?;
        Ok(())
    }

    fn render_script(&self) -> Result<Vec<String>, TaskError> {
        let name = shell_quote(&self.name);
        Ok(vec![
            "systemctl daemon-reload".to_string(),
            format!("systemctl enable --now {name}"),
        ])
    }
}
