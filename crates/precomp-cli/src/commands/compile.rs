use std::path::PathBuf;

use precomp_driver::{CompileOutcome, DriverError, DriverInterface, DriverResult};
use precomp_engine::CodeAddress;
use precomp_handles::TypeRef;
use precomp_recorder::{check_balance, TraceEvent};

use super::{ObserverKind, Session};
use crate::error::CliError;
use crate::manifest::{CompileRequest, PrecompManifest, TypeSpec};

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// One line per request followed by the recorded events
    Text,
    /// Counts only
    Summary,
}

#[derive(Debug, PartialEq, Eq)]
pub enum RequestResult {
    Compiled(CompileOutcome),
    /// Called through the engine; carries the entry point, if the method has one.
    Invoked(Option<CodeAddress>),
}

#[derive(Debug)]
pub struct RequestReport {
    pub label: String,
    pub result: DriverResult<RequestResult>,
}

#[derive(Debug)]
pub struct CompileReport {
    pub requests: Vec<RequestReport>,
    pub events: Vec<TraceEvent>,
    pub recorded: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl CompileReport {
    pub fn failures(&self) -> usize {
        self.requests.iter().filter(|r| r.result.is_err()).count()
    }
}

/// Resolves `spec`, specializing it when it carries arguments. Plain names are
/// looked up in `module`.
pub fn resolve_type(
    driver: &dyn DriverInterface,
    module: &str,
    spec: &TypeSpec,
) -> DriverResult<TypeRef> {
    match spec {
        TypeSpec::Name(name) => driver.resolve_class(module, name),
        TypeSpec::Generic {
            module: explicit,
            class,
            args,
        } => {
            let module = explicit.as_deref().unwrap_or(module);
            let generic = driver.resolve_class(module, class)?;
            if args.is_empty() {
                return Ok(generic);
            }
            let args = args
                .iter()
                .map(|arg| resolve_type(driver, module, arg))
                .collect::<DriverResult<Vec<_>>>()?;
            driver.specialize_class(generic, &args)
        }
    }
}

fn run_request(session: &Session, request: &CompileRequest) -> DriverResult<RequestResult> {
    let driver = session.driver.as_ref();
    let owner = resolve_type(driver, &request.module, &request.owner())?;
    let mut function = driver.resolve_function(owner, &request.method, &request.signature)?;
    if !request.method_args.is_empty() {
        let args = request
            .method_args
            .iter()
            .map(|arg| resolve_type(driver, &request.module, arg))
            .collect::<DriverResult<Vec<_>>>()?;
        function = driver.specialize_function(function, &args)?;
    }

    if request.invoke {
        let method = session.driver.method_key(function)?;
        let entry = session.engine.invoke(method).map_err(DriverError::from)?;
        Ok(RequestResult::Invoked(entry))
    } else {
        Ok(RequestResult::Compiled(driver.compile_function(function)?))
    }
}

/// Runs every request in order. A failing request does not stop the others.
pub fn run_requests(session: &Session, requests: &[CompileRequest]) -> CompileReport {
    let requests = requests
        .iter()
        .map(|request| {
            let result = run_request(session, request);
            if let Err(e) = &result {
                log::debug!("request {} failed: {}", request.label(), e);
            }
            RequestReport {
                label: request.label(),
                result,
            }
        })
        .collect();

    let stats = session.hook.stats();
    CompileReport {
        requests,
        events: session
            .recorder
            .as_ref()
            .map(|recorder| recorder.events())
            .unwrap_or_default(),
        recorded: stats.recorded(),
        skipped: stats.skipped(),
        failed: stats.failed(),
    }
}

fn describe(result: &DriverResult<RequestResult>) -> String {
    match result {
        Ok(RequestResult::Compiled(CompileOutcome::Compiled { code_size })) => {
            format!("compiled ({} bytes)", code_size)
        }
        Ok(RequestResult::Compiled(CompileOutcome::AlreadyCompiled)) => {
            "already compiled".to_string()
        }
        Ok(RequestResult::Compiled(CompileOutcome::Unable(reason))) => {
            format!("unable: {}", reason)
        }
        Ok(RequestResult::Invoked(Some(entry))) => format!("invoked at {:#x}", entry.0),
        Ok(RequestResult::Invoked(None)) => "invoked, no native code".to_string(),
        Err(e) => format!("error [{}]: {}", e.status(), e),
    }
}

fn print_report(report: &CompileReport, format: OutputFormat) {
    if format == OutputFormat::Text {
        for request in &report.requests {
            println!("{:<48} {}", request.label, describe(&request.result));
        }
        if !report.events.is_empty() {
            println!();
            for event in &report.events {
                println!("  {}", event);
            }
        }
        println!();
    }
    println!(
        "{} requests, {} failed; {} traces recorded ({} events), {} skipped, {} not recordable",
        report.requests.len(),
        report.failures(),
        report.recorded,
        report.events.len(),
        report.skipped,
        report.failed
    );
}

pub fn handle_compile(
    manifest_path: PathBuf,
    observer: ObserverKind,
    verify: bool,
    format: OutputFormat,
) -> Result<(), CliError> {
    let manifest = PrecompManifest::load(&manifest_path)?;
    let session = Session::open(&manifest_path, &manifest, observer)?;
    let report = run_requests(&session, &manifest.requests);
    print_report(&report, format);

    if verify {
        let methods = check_balance(&report.events)?;
        println!("trace replays to {} methods", methods.len());
    }

    match report.failures() {
        0 => Ok(()),
        failed => Err(CliError::RequestsFailed {
            failed,
            total: report.requests.len(),
        }),
    }
}
