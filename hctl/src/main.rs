//! `hctl` binary entrypoint: parse flags, load config, build the command
//! context, dispatch, and translate the outermost error kind into a process
//! exit code.
//!
//! A thin entrypoint: `clap` parse, `env_logger::init()`, dispatch into
//! `lib.rs`'s async command handlers, map the outermost `Result` to
//! `process::exit`.
use clap::Parser;
use hctl::cli::{
    complete_names, generate_completion, open_url, parse_duration, resolve_output_format,
    resolve_workload_name, scrape_route_url, warn_if_multiple_deployments, Cli, Commands, VclusterAction,
};
use hctl::cluster::ClusterClient;
use hctl::context::{CommandContext, DEFAULT_DEADLINE};
use hctl::diagnose::{diagnose, DiagnoseContext};
use hctl::git::GitWorkspace;
use hctl::output::OutputAdapter;
use hctl::platform_status;
use hctl::translate::translate;
use hctl::vcluster::{self, VClusterLifecycle};
use hctl_core::config::Config;
use hctl_core::error::{ErrorKind, Result};
use hctl_core::provisioner::ProvisionerRegistry;
use hctl_core::request::{Isolation, Preset, RequestInput};
use std::io::Write;
use std::time::Duration;

const VCLUSTER_RESOURCE_KIND: &str = vcluster::VCLUSTER_RESOURCE_KIND;

#[tokio::main]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let verbose = cli.verbose;
    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            let output = OutputAdapter::new(hctl::output::OutputFormat::Text, false);
            output.error(&e, verbose);
            e.exit_code()
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<i32> {
    let format = resolve_output_format(&cli)?;
    let output = OutputAdapter::new(format, cli.quiet);

    if matches!(cli.command, Commands::Init) {
        let path = Config::default_path()?;
        Config::load_or_init(&path)?;
        output.success(&format!("wrote config to {}", path.display()));
        return Ok(0);
    }

    if matches!(cli.command, Commands::Version) {
        output.line(&format!("hctl {}", env!("CARGO_PKG_VERSION")));
        return Ok(0);
    }

    if let Commands::Completion { shell } = cli.command {
        generate_completion(shell, &mut std::io::stdout());
        return Ok(0);
    }

    let config_path = Config::default_path()?;
    let mut config = Config::load(&config_path)?;
    if cli.non_interactive {
        config.interactive = false;
    }
    if cli.quiet {
        config.quiet = true;
    }
    if cli.verbose {
        config.verbose = true;
    }

    let deadline = match &cli.deadline {
        Some(raw) => Some(parse_duration(raw)?),
        None if indefinite_command(&cli.command) => None,
        None => Some(DEFAULT_DEADLINE),
    };

    let ctx = CommandContext::new(config.clone(), output.clone(), deadline);

    match cli.command {
        Commands::Init | Commands::Version | Commands::Completion { .. } => unreachable!("handled above"),
        Commands::Status => cmd_status(&ctx, cli.context.as_deref(), cli.watch, cli.interval.as_deref()).await,
        Commands::Context { set } => cmd_context(cli.context.as_deref(), &mut config, &config_path, set, &output).await,
        Commands::Diagnose { name } => cmd_diagnose(&ctx, cli.context.as_deref(), &name).await,
        Commands::Reconcile { name, force_all_linked } => {
            cmd_reconcile(&ctx, cli.context.as_deref(), &name, force_all_linked).await
        }
        Commands::Vcluster { action } => cmd_vcluster(&ctx, cli.context.as_deref(), action).await,
        Commands::Deploy { path, cluster, auto_commit } => cmd_deploy(&ctx, &path, cluster.as_deref(), auto_commit).await,
        Commands::Up { workload, replicas } => cmd_scale(&ctx, cli.context.as_deref(), workload.as_deref(), replicas).await,
        Commands::Down { workload } => cmd_scale(&ctx, cli.context.as_deref(), workload.as_deref(), 0).await,
        Commands::Open { workload } => cmd_open(&ctx, workload.as_deref()).await,
        Commands::Logs { workload, follow, tail, container } => {
            cmd_logs(&ctx, cli.context.as_deref(), workload.as_deref(), follow, tail, container.as_deref()).await
        }
        Commands::CompleteNames { kind } => {
            let client = ClusterClient::connect(cli.context.as_deref(), config.kube_context.as_deref()).await?;
            complete_names(&ctx, &client, &kind).await;
            Ok(0)
        }
    }
}

/// Commands whose natural duration is unbounded.
fn indefinite_command(cmd: &Commands) -> bool {
    matches!(
        cmd,
        Commands::Logs { follow: true, .. }
            | Commands::Vcluster { action: VclusterAction::Create { no_wait: false, .. } }
    )
}

async fn cmd_status(ctx: &CommandContext, context_flag: Option<&str>, watch: bool, interval: Option<&str>) -> Result<i32> {
    let client = ClusterClient::connect(context_flag, ctx.config.kube_context.as_deref()).await?;
    let interval = match interval {
        Some(raw) => parse_duration(raw)?,
        None => Duration::from_secs(5),
    };
    loop {
        let status = platform_status::collect(
            &client,
            &ctx.config.platform.platform_namespace,
            &ctx.config.platform.requests_namespace,
        )
        .await;
        ctx.output.render_platform_status(&status);
        if !watch {
            return Ok(0);
        }
        if ctx.is_cancelled() {
            return Ok(0);
        }
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = ctx.cancellation().cancelled() => return Ok(0),
        }
    }
}

async fn cmd_context(
    context_flag: Option<&str>,
    config: &mut Config,
    config_path: &std::path::Path,
    set: Option<String>,
    output: &OutputAdapter,
) -> Result<i32> {
    match set {
        Some(name) => {
            config.kube_context = Some(name.clone());
            config.save(config_path)?;
            output.success(&format!("default context set to '{}'", name));
        }
        None => {
            // Resolve the same way every cluster-touching command does
            // (explicit flag > process config > kubeconfig current-context),
            // so `hctl context` reports what's actually in effect.
            let client = ClusterClient::connect(context_flag, config.kube_context.as_deref()).await?;
            output.line(client.context_name());
        }
    }
    Ok(0)
}

async fn cmd_diagnose(ctx: &CommandContext, context_flag: Option<&str>, name: &str) -> Result<i32> {
    let client = ClusterClient::connect(context_flag, ctx.config.kube_context.as_deref()).await?;
    let diag_ctx = DiagnoseContext {
        client: &client,
        resource_kind: VCLUSTER_RESOURCE_KIND,
        platform_namespace: &ctx.config.platform.platform_namespace,
        requests_namespace: &ctx.config.platform.requests_namespace,
    };
    let report = diagnose(&diag_ctx, name).await?;
    ctx.output.render_diagnostic(&report);
    if report.all_healthy() {
        Ok(0)
    } else {
        let root = report.root_cause().expect("not all_healthy implies a root cause");
        Ok(exit_code_for_label(root.error_label.as_deref()))
    }
}

/// Map a `StepResult.error_label` (an `ErrorKind::label()`) back to its
/// numeric exit code (spec §6: "`hctl diagnose` … exits non-zero on the
/// earliest terminal step's category").
fn exit_code_for_label(label: Option<&str>) -> i32 {
    match label {
        Some("ConfigError") => ErrorKind::config("").exit_code(),
        Some("ValidationError") => ErrorKind::validation("").exit_code(),
        Some("NotFoundError") => ErrorKind::not_found("").exit_code(),
        Some("NetworkError") => ErrorKind::network("").exit_code(),
        Some("PermissionError") => ErrorKind::permission("").exit_code(),
        Some("ConflictError") => ErrorKind::conflict("").exit_code(),
        Some("TimeoutError") => ErrorKind::timeout("").exit_code(),
        _ => ErrorKind::internal("").exit_code(),
    }
}

async fn cmd_reconcile(ctx: &CommandContext, context_flag: Option<&str>, name: &str, force_all_linked: bool) -> Result<i32> {
    let client = ClusterClient::connect(context_flag, ctx.config.kube_context.as_deref()).await?;
    client
        .annotate_resource(
            "platform.hctl.io",
            "v1alpha1",
            VCLUSTER_RESOURCE_KIND,
            &ctx.config.platform.requests_namespace,
            name,
            vcluster::MANUAL_RECONCILE_ANNOTATION,
            &chrono::Utc::now().to_rfc3339(),
        )
        .await?;
    if force_all_linked {
        ctx.output.line("reconcile does not fan out to linked apps; use 'hctl vcluster sync --force-all-linked'");
    }
    ctx.output.success(&format!("requested reconciliation for {}", name));
    Ok(0)
}

async fn cmd_vcluster(ctx: &CommandContext, context_flag: Option<&str>, action: VclusterAction) -> Result<i32> {
    let client = ClusterClient::connect(context_flag, ctx.config.kube_context.as_deref()).await?;
    let cwd = std::env::current_dir().map_err(|e| ErrorKind::internal(format!("could not read cwd: {}", e)))?;
    let git = GitWorkspace::discover(&cwd)?;
    let lifecycle = VClusterLifecycle { client: &client, git: &git, config: &ctx.config, output: &ctx.output };

    match action {
        VclusterAction::Create {
            name,
            preset,
            isolation,
            hostname,
            replicas,
            static_vip,
            subnet_cidr,
            chart_repo_url,
            chart_name,
            chart_version,
            labels,
            annotations,
            egress,
            enable_nfs,
            auto_commit,
            no_wait,
        } => {
            let name = match name {
                Some(n) => n,
                None if ctx.config.interactive => {
                    let wizard_input = vcluster::interactive_wizard(&ctx.config.platform.domain)?;
                    return finish_create(&lifecycle, ctx, wizard_input, auto_commit, no_wait).await;
                }
                None => return Err(ErrorKind::validation("a vcluster name is required in --non-interactive mode").into()),
            };

            let (cluster_labels, cluster_annotations) = vcluster::parse_labels_and_annotations(&labels, &annotations)?;
            let egress_allowances = vcluster::parse_egress_allowances(&egress)?;
            let input = RequestInput {
                name,
                preset: preset.as_deref().map(str::parse::<Preset>).transpose().map_err(ErrorKind::validation)?,
                isolation: isolation
                    .as_deref()
                    .map(str::parse::<Isolation>)
                    .transpose()
                    .map_err(ErrorKind::validation)?,
                replicas,
                hostname,
                static_vip,
                subnet_cidr,
                cluster_labels,
                cluster_annotations,
                chart_repo_url: chart_repo_url
                    .unwrap_or_else(|| hctl_core::request::DEFAULT_CHART_REPO_URL.to_string()),
                chart_name: chart_name.unwrap_or_else(|| "vcluster".to_string()),
                chart_version: chart_version
                    .unwrap_or_else(|| hctl_core::request::DEFAULT_CHART_VERSION.to_string()),
                egress_allowances,
                enable_nfs,
                ..Default::default()
            };
            finish_create(&lifecycle, ctx, input, auto_commit, no_wait).await
        }
        VclusterAction::Status { name } => {
            let status = lifecycle.fetch_status(&name).await?;
            ctx.output.emit(&status, || {
                ctx.output.line(&format!("{}: {}", status.name, status.phase));
            });
            Ok(if matches!(status.phase, hctl_core::status::Phase::Ready) { 0 } else { 1 })
        }
        VclusterAction::Sync { name, force_all_linked } => {
            lifecycle.resync(&name, force_all_linked).await?;
            ctx.output.success(&format!("resync requested for {}", name));
            Ok(0)
        }
        VclusterAction::Kubeconfig { name } => {
            let config_home = dirs::config_dir().ok_or_else(|| ErrorKind::config("could not determine a config directory"))?;
            let path = lifecycle.fetch_kubeconfig(&name, &config_home).await?;
            ctx.output.line(&path.display().to_string());
            Ok(0)
        }
        VclusterAction::Delete { name, auto_commit } => {
            let path = lifecycle.delete(&name, auto_commit)?;
            ctx.output.success(&format!("removed {}", path.display()));
            Ok(0)
        }
    }
}

async fn finish_create(
    lifecycle: &VClusterLifecycle<'_>,
    ctx: &CommandContext,
    input: RequestInput,
    auto_commit: bool,
    no_wait: bool,
) -> Result<i32> {
    let request = hctl_core::request::build_request(input, &ctx.config.platform.domain)?;
    lifecycle.render_and_write(&request, auto_commit)?;
    if no_wait {
        ctx.output.success(&format!("vcluster request {} written", request.spec.name));
        return Ok(0);
    }
    let status = lifecycle
        .watch_readiness(&request.spec.name, ctx, &format!("waiting for {} to become ready", request.spec.name))
        .await?;
    ctx.output.emit(&status, || {
        ctx.output.success(&format!("{} is {}", status.name, status.phase));
    });

    if matches!(status.phase, hctl_core::status::Phase::Ready) {
        let diag_ctx = DiagnoseContext {
            client: lifecycle.client,
            resource_kind: VCLUSTER_RESOURCE_KIND,
            platform_namespace: &ctx.config.platform.platform_namespace,
            requests_namespace: &ctx.config.platform.requests_namespace,
        };
        if let Ok(report) = diagnose(&diag_ctx, &request.spec.name).await {
            ctx.output.render_diagnostic(&report);
        }
    }
    Ok(0)
}

async fn cmd_deploy(ctx: &CommandContext, path: &std::path::Path, cluster: Option<&str>, auto_commit: bool) -> Result<i32> {
    let workload = hctl_core::score::Workload::from_file(path)?;
    let registry = ProvisionerRegistry::with_builtins();
    let cwd = std::env::current_dir().map_err(|e| ErrorKind::internal(format!("could not read cwd: {}", e)))?;
    let git = GitWorkspace::discover(&cwd)?;

    let result = translate(&workload, &registry, cluster, ctx.config.default_cluster.as_deref(), git.root())?;
    let mode = if auto_commit { hctl_core::config::GitMode::Auto } else { ctx.config.git_mode };
    let written = git.idempotent_write(
        &result.files,
        "Deploy workload",
        &result.workload_name,
        mode,
        &ctx.output,
    )?;
    for p in &written {
        ctx.output.line(&format!("wrote {}", p.display()));
    }
    Ok(0)
}

async fn cmd_scale(ctx: &CommandContext, context_flag: Option<&str>, workload: Option<&str>, replicas: i32) -> Result<i32> {
    let name = resolve_workload_name(workload)?;
    let client = ClusterClient::connect(context_flag, ctx.config.kube_context.as_deref()).await?;
    let deployments = client.list_deployments(&ctx.config.platform.platform_namespace).await?;
    let matching: Vec<_> = deployments.into_iter().filter(|d| d.name == name || d.argocd_app.as_deref() == Some(name.as_str())).collect();
    if matching.is_empty() {
        return Err(ErrorKind::not_found(format!("no deployment found for workload '{}'", name)).into());
    }
    warn_if_multiple_deployments(&ctx.output, &name, matching.len());
    for d in &matching {
        client.patch_deployment_replicas(&d.namespace, &d.name, replicas).await?;
    }
    ctx.output.success(&format!("scaled {} deployment(s) for '{}' to {} replicas", matching.len(), name, replicas));
    Ok(0)
}

async fn cmd_open(ctx: &CommandContext, workload: Option<&str>) -> Result<i32> {
    let name = resolve_workload_name(workload)?;
    let cwd = std::env::current_dir().map_err(|e| ErrorKind::internal(format!("could not read cwd: {}", e)))?;
    let git = GitWorkspace::discover(&cwd)?;
    let cluster = ctx
        .config
        .default_cluster
        .clone()
        .ok_or_else(|| ErrorKind::config("no default cluster configured; pass --cluster on 'hctl deploy' or set defaultCluster"))?;
    let values_path = git.root().join(format!("workloads/{}/addons/{}/values.yaml", cluster, name));
    let raw = std::fs::read_to_string(&values_path)
        .map_err(|_| ErrorKind::not_found(format!("no translated values found for '{}' at {}", name, values_path.display())))?;
    let url = scrape_route_url(&raw)
        .ok_or_else(|| ErrorKind::not_found(format!("workload '{}' has no route to open", name)))?;
    ctx.output.line(&url);
    open_url(&url)?;
    Ok(0)
}

async fn cmd_logs(
    ctx: &CommandContext,
    context_flag: Option<&str>,
    workload: Option<&str>,
    follow: bool,
    tail: Option<i64>,
    container: Option<&str>,
) -> Result<i32> {
    let name = resolve_workload_name(workload)?;
    let client = ClusterClient::connect(context_flag, ctx.config.kube_context.as_deref()).await?;
    let pods = client.list_pods(&ctx.config.platform.platform_namespace, &format!("app={}", name)).await?;
    let pod = pods
        .first()
        .and_then(|p| p.metadata.name.clone())
        .ok_or_else(|| ErrorKind::not_found(format!("no pods found for workload '{}'", name)))?;
    let mut stdout = std::io::stdout();
    client
        .stream_logs(&ctx.config.platform.platform_namespace, &pod, container, follow, tail, &mut stdout)
        .await?;
    stdout.flush().ok();
    Ok(0)
}

