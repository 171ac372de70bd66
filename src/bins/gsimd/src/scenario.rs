//! Call-flow scenarios
//!
//! A scenario is a flattened sequence of send / receive / wait jobs every
//! UE session steps through. Each job owns the running counters the
//! dashboard displays; all sessions share them. The procedure grouping is
//! purely presentational.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Deserialize;

use gsim_core::config::{Config, NodeType};
use gsim_gtp::header::{Gtp2MessageType, Gtp2MsgCategory};
use gsim_gtp::message::Gtp2Message;

use crate::error::{SimError, SimResult};
use crate::msg_build;

/// What a scenario step does
#[derive(Debug, Clone)]
pub enum JobKind {
    /// Send the template message
    Send(Gtp2Message),
    /// Wait for an inbound message of this type
    Recv(u8),
    /// Idle for this many milliseconds
    Wait(u64),
}

/// Per-job running counters, shared by every session playing the scenario
#[derive(Debug, Default)]
pub struct JobCounters {
    pub num_snd: AtomicU64,
    pub num_snd_retrans: AtomicU64,
    pub num_rcv: AtomicU64,
    pub num_rcv_retrans: AtomicU64,
    pub num_timeout: AtomicU64,
    pub num_unexp: AtomicU64,
}

impl JobCounters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}

/// One scenario step
#[derive(Debug)]
pub struct Job {
    pub kind: JobKind,
    pub msg_name: &'static str,
    pub counters: JobCounters,
}

impl Job {
    fn send(template: Gtp2Message) -> Self {
        let msg_name = gsim_gtp::header::msg_name(template.msg_type());
        Self {
            kind: JobKind::Send(template),
            msg_name,
            counters: JobCounters::default(),
        }
    }

    fn recv(msg_type: Gtp2MessageType) -> Self {
        Self {
            kind: JobKind::Recv(msg_type as u8),
            msg_name: msg_type.name(),
            counters: JobCounters::default(),
        }
    }

    fn wait(ms: u64) -> Self {
        Self {
            kind: JobKind::Wait(ms),
            msg_name: "Wait",
            counters: JobCounters::default(),
        }
    }

    /// Message type this job sends or expects, if any
    pub fn msg_type(&self) -> Option<u8> {
        match &self.kind {
            JobKind::Send(msg) => Some(msg.msg_type()),
            JobKind::Recv(t) => Some(*t),
            JobKind::Wait(_) => None,
        }
    }
}

/// GTP-C interface the scenario plays; drives control-tunnel sharing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GtpInterface {
    /// S11/S4: one control tunnel shared across all PDNs of a UE
    S11,
    /// S5/S8: a fresh control tunnel per PDN
    S5S8,
}

/// Display grouping kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcType {
    Wait,
    ReqRsp,
    ReqTrigRep,
}

/// Display grouping over job indices
#[derive(Debug)]
pub struct Procedure {
    pub kind: ProcType,
    pub jobs: Vec<usize>,
}

/// A scripted call flow
#[derive(Debug)]
pub struct Scenario {
    pub jobs: Vec<Job>,
    pub interface: GtpInterface,
}

impl Scenario {
    /// True when sessions playing this scenario originate the call flow
    pub fn is_originating(&self) -> bool {
        self.jobs
            .iter()
            .find(|job| !matches!(job.kind, JobKind::Wait(_)))
            .is_some_and(|job| matches!(job.kind, JobKind::Send(_)))
    }

    /// Counters of the job at `index`
    pub fn counters(&self, index: usize) -> &JobCounters {
        &self.jobs[index].counters
    }

    /// The built-in scenario for a node type: the originating side runs
    /// attach / modify / detach, the terminating side mirrors it
    pub fn default_for(node: NodeType, cfg: &Config) -> Self {
        let jobs = if node.is_originating() {
            vec![
                Job::send(msg_build::build_create_session_request(cfg)),
                Job::recv(Gtp2MessageType::CreateSessionResponse),
                Job::send(msg_build::build_modify_bearer_request(cfg)),
                Job::recv(Gtp2MessageType::ModifyBearerResponse),
                Job::wait(500),
                Job::send(msg_build::build_delete_session_request(cfg)),
                Job::recv(Gtp2MessageType::DeleteSessionResponse),
            ]
        } else {
            vec![
                Job::recv(Gtp2MessageType::CreateSessionRequest),
                Job::send(msg_build::build_create_session_response(cfg)),
                Job::recv(Gtp2MessageType::ModifyBearerRequest),
                Job::send(msg_build::build_modify_bearer_response(cfg)),
                Job::recv(Gtp2MessageType::DeleteSessionRequest),
                Job::send(msg_build::build_delete_session_response(cfg)),
            ]
        };
        Self {
            jobs,
            interface: GtpInterface::S11,
        }
    }

    /// Load a scenario from a YAML file
    pub fn from_file(path: &Path, cfg: &Config) -> SimResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| SimError::Scenario(format!("{}: {e}", path.display())))?;
        Self::from_yaml(&text, cfg)
    }

    /// Parse a scenario from YAML text
    pub fn from_yaml(text: &str, cfg: &Config) -> SimResult<Self> {
        let file: ScenarioFile =
            serde_yaml::from_str(text).map_err(|e| SimError::Scenario(e.to_string()))?;

        let interface = match file.interface.as_deref() {
            None | Some("s11") | Some("s4") => GtpInterface::S11,
            Some("s5") | Some("s8") | Some("s5s8") => GtpInterface::S5S8,
            Some(other) => {
                return Err(SimError::Scenario(format!("unknown interface: {other}")))
            }
        };

        let mut jobs = Vec::new();
        for (i, step) in file.steps.iter().enumerate() {
            jobs.push(step.to_job(i, cfg)?);
        }
        if jobs.is_empty() {
            return Err(SimError::Scenario("scenario has no steps".into()));
        }

        Ok(Self { jobs, interface })
    }

    /// Group the flattened job sequence into display procedures
    pub fn procedures(&self) -> Vec<Procedure> {
        let mut procs = Vec::new();
        let mut i = 0;
        while i < self.jobs.len() {
            match &self.jobs[i].kind {
                JobKind::Wait(_) => {
                    procs.push(Procedure {
                        kind: ProcType::Wait,
                        jobs: vec![i],
                    });
                    i += 1;
                }
                _ => {
                    let triggered = self.is_request(i)
                        && self.is_request(i + 1)
                        && self.is_response(i + 2);
                    if triggered {
                        procs.push(Procedure {
                            kind: ProcType::ReqTrigRep,
                            jobs: vec![i, i + 1, i + 2],
                        });
                        i += 3;
                    } else if self.is_response(i + 1) {
                        procs.push(Procedure {
                            kind: ProcType::ReqRsp,
                            jobs: vec![i, i + 1],
                        });
                        i += 2;
                    } else {
                        procs.push(Procedure {
                            kind: ProcType::ReqRsp,
                            jobs: vec![i],
                        });
                        i += 1;
                    }
                }
            }
        }
        procs
    }

    fn job_category(&self, index: usize) -> Option<Gtp2MsgCategory> {
        self.jobs
            .get(index)
            .and_then(|job| job.msg_type())
            .map(gsim_gtp::header::msg_category)
    }

    fn is_request(&self, index: usize) -> bool {
        self.job_category(index) == Some(Gtp2MsgCategory::Request)
    }

    fn is_response(&self, index: usize) -> bool {
        self.job_category(index) == Some(Gtp2MsgCategory::Response)
    }
}

#[derive(Debug, Deserialize)]
struct ScenarioFile {
    interface: Option<String>,
    steps: Vec<ScenarioStep>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScenarioStep {
    send: Option<String>,
    recv: Option<String>,
    wait: Option<u64>,
}

impl ScenarioStep {
    fn to_job(&self, index: usize, cfg: &Config) -> SimResult<Job> {
        match (&self.send, &self.recv, self.wait) {
            (Some(name), None, None) => {
                let msg_type = msg_type_from_name(name)
                    .ok_or_else(|| SimError::Scenario(format!("step {index}: unknown message: {name}")))?;
                let template = msg_build::template(msg_type, cfg).ok_or_else(|| {
                    SimError::Scenario(format!("step {index}: no template for {name}"))
                })?;
                Ok(Job::send(template))
            }
            (None, Some(name), None) => {
                let msg_type = msg_type_from_name(name)
                    .ok_or_else(|| SimError::Scenario(format!("step {index}: unknown message: {name}")))?;
                Ok(Job::recv(msg_type))
            }
            (None, None, Some(ms)) => Ok(Job::wait(ms)),
            _ => Err(SimError::Scenario(format!(
                "step {index}: exactly one of send/recv/wait required"
            ))),
        }
    }
}

/// Resolve a kebab-case message name from a scenario file
fn msg_type_from_name(name: &str) -> Option<Gtp2MessageType> {
    let wanted = name.to_ascii_lowercase();
    [
        Gtp2MessageType::EchoRequest,
        Gtp2MessageType::EchoResponse,
        Gtp2MessageType::CreateSessionRequest,
        Gtp2MessageType::CreateSessionResponse,
        Gtp2MessageType::ModifyBearerRequest,
        Gtp2MessageType::ModifyBearerResponse,
        Gtp2MessageType::DeleteSessionRequest,
        Gtp2MessageType::DeleteSessionResponse,
        Gtp2MessageType::CreateBearerRequest,
        Gtp2MessageType::CreateBearerResponse,
        Gtp2MessageType::UpdateBearerRequest,
        Gtp2MessageType::UpdateBearerResponse,
        Gtp2MessageType::DeleteBearerRequest,
        Gtp2MessageType::DeleteBearerResponse,
        Gtp2MessageType::ReleaseAccessBearersRequest,
        Gtp2MessageType::ReleaseAccessBearersResponse,
        Gtp2MessageType::DownlinkDataNotification,
        Gtp2MessageType::DownlinkDataNotificationAcknowledge,
    ]
    .into_iter()
    .find(|t| t.name().to_ascii_lowercase() == wanted)
}
