//! Launch pipeline - orchestrates one cluster launch end to end
//!
//! Five discrete stages run in order; any error falls through a single
//! Fail transition that records the stage name and the cause, publishes a
//! failure notification, and returns. No resource exists until the create
//! stage, so every validation failure is side-effect free.

use crate::completion::{
    CompletionBackend, CompletionOutcome, CompletionTracker, LocalCompletion, PollSwitch,
    StatusPoller,
};
use crate::core::document::{FieldPath, LaunchDocument};
use crate::core::error::LaunchError;
use crate::core::overrides::{self, OverrideSpec};
use crate::notify::Notifier;
use crate::pipeline::context::ExecutionContext;
use crate::pipeline::input::LaunchInput;
use crate::provision::{with_retries, ClusterApi, ClusterStatus, ClusterStep, RetryPolicy};
use crate::registry::templates::TemplateStore;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

/// The discrete stages of a launch run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    LoadConfiguration,
    ResolveOverrides,
    GuardAlreadyRunning,
    MergeRuntimeTags,
    CreateResource,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::LoadConfiguration => "load-configuration",
            Stage::ResolveOverrides => "resolve-overrides",
            Stage::GuardAlreadyRunning => "guard-already-running",
            Stage::MergeRuntimeTags => "merge-runtime-tags",
            Stage::CreateResource => "create-resource",
        }
    }

    const ORDER: [Stage; 5] = [
        Stage::LoadConfiguration,
        Stage::ResolveOverrides,
        Stage::GuardAlreadyRunning,
        Stage::MergeRuntimeTags,
        Stage::CreateResource,
    ];
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Events that can occur during a launch run
#[derive(Debug, Clone)]
pub enum LaunchEvent {
    LaunchStarted {
        execution_id: Uuid,
        function: String,
    },
    StageStarted {
        stage: Stage,
    },
    StageCompleted {
        stage: Stage,
    },
    ClusterCreated {
        execution_id: Uuid,
        cluster_id: String,
    },
    LaunchSucceeded {
        execution_id: Uuid,
        cluster_id: String,
    },
    LaunchFailed {
        execution_id: Uuid,
        stage: Stage,
        error: String,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(LaunchEvent) + Send + Sync>;

/// Tuning knobs shared by every run through one pipeline
#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    /// Retry budget for each external call
    pub retry: RetryPolicy,
    /// Status poll cadence; also paces heartbeats, so it must undercut the
    /// completion backend's watchdog timeout
    pub poll_interval: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            poll_interval: Duration::from_secs(30),
        }
    }
}

/// What a successful run hands back to the caller
#[derive(Debug, Clone)]
pub struct LaunchReport {
    pub execution_id: Uuid,
    pub cluster_id: String,
    pub cluster_name: String,
    /// Present when the run waited for completion
    pub outcome: Option<CompletionOutcome>,
}

/// Main launch pipeline
pub struct LaunchPipeline {
    store: TemplateStore,
    clusters: Arc<dyn ClusterApi>,
    notifier: Arc<dyn Notifier>,
    completion: Arc<LocalCompletion>,
    tracker: Arc<CompletionTracker>,
    switch: Arc<PollSwitch>,
    settings: PipelineSettings,
    event_handlers: Arc<Mutex<Vec<EventHandler>>>,
}

impl LaunchPipeline {
    pub fn new(
        store: TemplateStore,
        clusters: Arc<dyn ClusterApi>,
        notifier: Arc<dyn Notifier>,
        settings: PipelineSettings,
    ) -> Self {
        let completion = Arc::new(LocalCompletion::new());
        let switch = Arc::new(PollSwitch::new());
        let tracker = Arc::new(CompletionTracker::new(completion.clone(), switch.clone()));

        Self {
            store,
            clusters,
            notifier,
            completion,
            tracker,
            switch,
            settings,
            event_handlers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn tracker(&self) -> &Arc<CompletionTracker> {
        &self.tracker
    }

    /// Spawn the status poll loop backing the completion protocol
    pub fn spawn_poller(&self) -> JoinHandle<()> {
        StatusPoller::new(
            self.clusters.clone(),
            self.tracker.clone(),
            self.switch.clone(),
            self.settings.poll_interval,
        )
        .spawn()
    }

    /// Add an event handler
    pub async fn add_event_handler<F>(&self, handler: F)
    where
        F: Fn(LaunchEvent) + Send + Sync + 'static,
    {
        self.event_handlers.lock().await.push(Arc::new(handler));
    }

    async fn emit_event(&self, event: LaunchEvent) {
        let handlers = self.event_handlers.lock().await;
        for handler in handlers.iter() {
            handler(event.clone());
        }
    }

    /// Execute one launch run
    pub async fn run(&self, input: LaunchInput) -> Result<LaunchReport, LaunchError> {
        let mut ctx = ExecutionContext::new(input);
        let execution_id = ctx.execution_id;

        info!(
            "starting launch {}/{} ({})",
            ctx.input.namespace, ctx.input.function, execution_id
        );
        self.emit_event(LaunchEvent::LaunchStarted {
            execution_id,
            function: format!("{}/{}", ctx.input.namespace, ctx.input.function),
        })
        .await;

        // Register interest before anything can resolve the token
        let wait_receiver = self.completion.register_waiter(&ctx.token).await;

        for stage in Stage::ORDER {
            self.emit_event(LaunchEvent::StageStarted { stage }).await;
            match self.run_stage(stage, &mut ctx).await {
                Ok(()) => self.emit_event(LaunchEvent::StageCompleted { stage }).await,
                Err(error) => return Err(self.fail(&ctx, stage, error).await),
            }
        }

        let cluster_id = ctx.cluster_id.clone().unwrap_or_default();
        let cluster_name = ctx.cluster_name.clone().unwrap_or_default();

        let wait = ctx
            .input
            .wait_for_completion
            .or(ctx.function.as_ref().map(|f| f.wait_for_completion))
            .unwrap_or(false);

        // The run only succeeds once the outcome is known; a wait that
        // resolves as failed takes the same terminal transition as a stage
        // error
        let outcome = if wait {
            match wait_receiver.await {
                Ok(CompletionOutcome::Failure { code, cause }) => {
                    let error = LaunchError::Completion { code, cause };
                    return Err(self.fail(&ctx, Stage::CreateResource, error).await);
                }
                Ok(outcome) => Some(outcome),
                Err(_) => {
                    let error = LaunchError::Completion {
                        code: "WAIT_ABANDONED".to_string(),
                        cause: "completion channel closed before resolution".to_string(),
                    };
                    return Err(self.fail(&ctx, Stage::CreateResource, error).await);
                }
            }
        } else {
            self.completion.unregister_waiter(&ctx.token).await;
            None
        };

        self.publish_success(&ctx, &cluster_id).await;
        self.emit_event(LaunchEvent::LaunchSucceeded {
            execution_id,
            cluster_id: cluster_id.clone(),
        })
        .await;

        Ok(LaunchReport {
            execution_id,
            cluster_id,
            cluster_name,
            outcome,
        })
    }

    async fn run_stage(&self, stage: Stage, ctx: &mut ExecutionContext) -> Result<(), LaunchError> {
        match stage {
            Stage::LoadConfiguration => self.stage_load(ctx).await,
            Stage::ResolveOverrides => self.stage_resolve_overrides(ctx),
            Stage::GuardAlreadyRunning => self.stage_guard(ctx).await,
            Stage::MergeRuntimeTags => self.stage_merge_tags(ctx),
            Stage::CreateResource => self.stage_create(ctx).await,
        }
    }

    /// Resolve the templates once and assemble the canonical base document
    async fn stage_load(&self, ctx: &mut ExecutionContext) -> Result<(), LaunchError> {
        let function = self
            .store
            .load_function(&ctx.input.namespace, &ctx.input.function)
            .await?;
        let profile = self
            .store
            .load_profile(&function.profile.namespace, &function.profile.name)
            .await?;
        let configuration = self
            .store
            .load_configuration(&function.configuration.namespace, &function.configuration.name)
            .await?;

        let mut document = configuration.document().clone();
        overlay_profile(&mut document, &profile)?;

        let cluster_name = ctx
            .input
            .cluster_name
            .clone()
            .unwrap_or_else(|| function.render_cluster_name());
        document.set(&path("Name")?, json!(cluster_name))?;

        // A keep-alive cluster settles into WAITING; a transient one only
        // ever reaches RUNNING before it terminates on its own
        let keep_alive = document
            .get(&path("Instances.KeepJobFlowAliveWhenNoSteps")?)
            .and_then(Value::as_bool)
            .unwrap_or(false);
        ctx.expected = if keep_alive {
            ClusterStatus::Waiting
        } else {
            ClusterStatus::Running
        };

        ctx.cluster_name = Some(cluster_name);
        ctx.function = Some(function);
        ctx.profile = Some(profile);
        ctx.configuration = Some(configuration);
        ctx.document = Some(document);
        Ok(())
    }

    /// Validate caller overrides against the allow-list and apply them
    fn stage_resolve_overrides(&self, ctx: &mut ExecutionContext) -> Result<(), LaunchError> {
        let (function, configuration, document) = loaded(ctx)?;

        // The configuration exposes the interface; the function may narrow
        // or extend it, and its entries win on collision
        let mut allowed: BTreeMap<String, OverrideSpec> = configuration.override_interface().clone();
        allowed.extend(
            function
                .allowed_overrides
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );

        let resolved = overrides::resolve(document, &ctx.input.overrides, &allowed)?;
        ctx.document = Some(resolved);
        Ok(())
    }

    /// Refuse to launch when a same-named cluster is already active
    async fn stage_guard(&self, ctx: &mut ExecutionContext) -> Result<(), LaunchError> {
        let function = ctx
            .function
            .as_ref()
            .ok_or_else(|| LaunchError::Template("launch function not loaded".to_string()))?;
        let fail_if_running = ctx.input.fail_if_running.unwrap_or(function.fail_if_running);
        if !fail_if_running {
            return Ok(());
        }

        let cluster_name = ctx
            .cluster_name
            .as_deref()
            .ok_or_else(|| LaunchError::Template("cluster name not assigned".to_string()))?;

        let active = with_retries("list_active", self.settings.retry, || {
            self.clusters.list_active()
        })
        .await?;

        if let Some(running) = active.iter().find(|c| c.name == cluster_name) {
            warn!(
                "cluster '{}' already active as {} ({})",
                cluster_name, running.id, running.status
            );
            return Err(LaunchError::AlreadyRunning(cluster_name.to_string()));
        }
        Ok(())
    }

    /// Merge run metadata and caller tags into the document (caller wins)
    fn stage_merge_tags(&self, ctx: &mut ExecutionContext) -> Result<(), LaunchError> {
        let execution_id = ctx.execution_id;
        let function_key = format!("{}/{}", ctx.input.namespace, ctx.input.function);
        let caller_tags = ctx.input.tags.clone();
        let document = ctx
            .document
            .as_mut()
            .ok_or_else(|| LaunchError::Template("document not assembled".to_string()))?;

        let mut tags = BTreeMap::new();
        tags.insert("launchpad:function".to_string(), function_key);
        tags.insert("launchpad:execution".to_string(), execution_id.to_string());
        document.merge_tags(&tags);
        document.merge_tags(&caller_tags);
        Ok(())
    }

    /// Create the cluster and hand the wait over to the completion tracker
    async fn stage_create(&self, ctx: &mut ExecutionContext) -> Result<(), LaunchError> {
        let document = ctx
            .document
            .as_ref()
            .ok_or_else(|| LaunchError::Template("document not assembled".to_string()))?;

        let request = document.stripped();
        let cluster_id =
            with_retries("create", self.settings.retry, || self.clusters.create(&request)).await?;

        info!("cluster {} created ({})", cluster_id, ctx.execution_id);
        self.tracker
            .register(&cluster_id, ctx.token.clone(), ctx.expected)
            .await;

        self.emit_event(LaunchEvent::ClusterCreated {
            execution_id: ctx.execution_id,
            cluster_id: cluster_id.clone(),
        })
        .await;
        ctx.cluster_id = Some(cluster_id);
        Ok(())
    }

    /// The single terminal Fail transition
    async fn fail(&self, ctx: &ExecutionContext, stage: Stage, error: LaunchError) -> LaunchError {
        warn!(
            "launch {} failed at {}: {}",
            ctx.execution_id, stage, error
        );

        if let Some(target) = ctx.function.as_ref().and_then(|f| f.failure_target.as_deref()) {
            let subject = format!(
                "launch failed: {}/{}",
                ctx.input.namespace, ctx.input.function
            );
            let message = format!("stage {}: {}", stage, error);
            if let Err(publish_err) = self.notifier.publish(target, &subject, &message).await {
                // The original cause always wins over notification trouble
                warn!("failure notification not delivered: {}", publish_err);
            }
        }

        // Nothing else will resolve this run's token once the run has failed
        if let Err(resolve_err) = self
            .completion
            .resolve_failure(&ctx.token, "LAUNCH_FAILED", &error.to_string())
            .await
        {
            warn!("token cleanup for {} failed: {}", ctx.execution_id, resolve_err);
        }

        self.emit_event(LaunchEvent::LaunchFailed {
            execution_id: ctx.execution_id,
            stage,
            error: error.to_string(),
        })
        .await;
        error
    }

    async fn publish_success(&self, ctx: &ExecutionContext, cluster_id: &str) {
        if let Some(target) = ctx.function.as_ref().and_then(|f| f.success_target.as_deref()) {
            let subject = format!(
                "launch succeeded: {}/{}",
                ctx.input.namespace, ctx.input.function
            );
            let message = format!(
                "cluster {} ({})",
                cluster_id,
                ctx.cluster_name.as_deref().unwrap_or("")
            );
            if let Err(err) = self.notifier.publish(target, &subject, &message).await {
                warn!("success notification not delivered: {}", err);
            }
        }
    }

    /// Record intent first, then ask the service; the tracker then treats
    /// the eventual TERMINATED status as a clean completion
    pub async fn terminate(&self, cluster_id: &str) -> Result<(), LaunchError> {
        self.tracker.mark_termination_requested(cluster_id).await;
        with_retries("terminate", self.settings.retry, || {
            self.clusters.terminate(cluster_id)
        })
        .await?;
        Ok(())
    }

    /// Submit a step to an already-launched cluster
    pub async fn add_step(
        &self,
        cluster_id: &str,
        step: &ClusterStep,
    ) -> Result<String, LaunchError> {
        let step_id = with_retries("add_step", self.settings.retry, || {
            self.clusters.add_step(cluster_id, step)
        })
        .await?;
        Ok(step_id)
    }
}

fn loaded(
    ctx: &ExecutionContext,
) -> Result<
    (
        &crate::core::function::LaunchFunction,
        &crate::core::configuration::Configuration,
        &LaunchDocument,
    ),
    LaunchError,
> {
    match (&ctx.function, &ctx.configuration, &ctx.document) {
        (Some(f), Some(c), Some(d)) => Ok((f, c, d)),
        _ => Err(LaunchError::Template(
            "templates not loaded before override resolution".to_string(),
        )),
    }
}

fn path(s: &str) -> Result<FieldPath, LaunchError> {
    s.parse()
}

/// Overlay the profile's network/identity/security settings onto the document
fn overlay_profile(
    document: &mut LaunchDocument,
    profile: &crate::core::profile::Profile,
) -> Result<(), LaunchError> {
    if let Some(log) = &profile.log_destination {
        document.set(&path("LogUri")?, json!(log))?;
    }
    if let Some(role) = &profile.instance_role {
        document.set(&path("JobFlowRole")?, json!(role))?;
    }
    if let Some(role) = &profile.service_role {
        document.set(&path("ServiceRole")?, json!(role))?;
    }
    if let Some(role) = &profile.autoscaling_role {
        document.set(&path("AutoScalingRole")?, json!(role))?;
    }
    if !profile.subnet_ids.is_empty() {
        document.set(&path("Instances.Ec2SubnetIds")?, json!(profile.subnet_ids))?;
    }

    let groups = &profile.security_groups;
    if let Some(sg) = &groups.managed_primary {
        document.set(&path("Instances.EmrManagedMasterSecurityGroup")?, json!(sg))?;
    }
    if let Some(sg) = &groups.managed_core {
        document.set(&path("Instances.EmrManagedSlaveSecurityGroup")?, json!(sg))?;
    }
    if let Some(sg) = &groups.service_access {
        document.set(&path("Instances.ServiceAccessSecurityGroup")?, json!(sg))?;
    }
    if !groups.additional_primary.is_empty() {
        document.set(
            &path("Instances.AdditionalMasterSecurityGroups")?,
            json!(groups.additional_primary),
        )?;
    }
    if !groups.additional_core.is_empty() {
        document.set(
            &path("Instances.AdditionalSlaveSecurityGroups")?,
            json!(groups.additional_core),
        )?;
    }

    if let Some(descriptor) = profile.security_configuration() {
        document.set(&path("SecurityConfiguration")?, descriptor.clone())?;
    }
    if let Some(kerberos) = profile.kerberos() {
        document.set(
            &path("KerberosAttributes")?,
            json!({
                "Realm": kerberos.realm,
                "KdcAdminPassword": kerberos.kdc_admin_password_secret,
                "CrossRealmTrustPrincipalPassword":
                    kerberos.cross_realm_trust_principal_password_secret,
            }),
        )?;
    }
    Ok(())
}
