// Agent command grammar
//
// Shared by the Linux, Docker and Kubernetes builders:
//   <base><binary> --operation <op> --faultname <agentName> <flags>

use crate::application::template::shell_quote;
use crate::domain::{FaultName, FaultOperation, FaultSpec};
use crate::error::{OrchestrationError, Result};

/// Agent-side name of a fault
pub fn agent_fault_name(fault: FaultName) -> Result<&'static str> {
    let name = match fault {
        FaultName::Cpu => "cpuFault",
        FaultName::Memory => "memoryFault",
        FaultName::DiskIo => "diskIOFault",
        FaultName::DiskSpace => "diskSpaceFault",
        FaultName::NetworkDelay
        | FaultName::NetworkPacketLoss
        | FaultName::NetworkPacketCorruption
        | FaultName::NetworkPacketDuplication => "networkFault",
        FaultName::FileHandlerLeak => "fileHandlerFault",
        FaultName::KillProcess => "killProcessFault",
        FaultName::KernelPanic => "kernelPanicFault",
        other => {
            return Err(OrchestrationError::Internal(format!(
                "'{}' is not an agent fault",
                other
            )))
        }
    };
    Ok(name)
}

fn network_operation(fault: FaultName) -> Option<&'static str> {
    match fault {
        FaultName::NetworkDelay => Some("DELAY"),
        FaultName::NetworkPacketLoss => Some("PACKET_LOSS"),
        FaultName::NetworkPacketCorruption => Some("PACKET_CORRUPTION"),
        FaultName::NetworkPacketDuplication => Some("PACKET_DUPLICATION"),
        _ => None,
    }
}

struct Flags(Vec<String>);

impl Flags {
    fn required(&mut self, spec: &FaultSpec, name: &str) -> Result<()> {
        let value = spec.required_arg(name)?;
        self.0.push(format!("--{} {}", name, shell_quote(value)));
        Ok(())
    }

    fn optional(&mut self, spec: &FaultSpec, name: &str) {
        if let Some(value) = spec.arg(name) {
            self.0.push(format!("--{} {}", name, shell_quote(value)));
        }
    }

    fn raw(&mut self, flag: String) {
        self.0.push(flag);
    }
}

/// Fault-specific flags; required arguments are validated for injection only
fn fault_flags(spec: &FaultSpec, fault: FaultName, operation: FaultOperation) -> Result<Vec<String>> {
    let mut flags = Flags(Vec::new());

    if let Some(op) = network_operation(fault) {
        flags.raw(format!("--faultOperation {}", op));
    }

    if operation != FaultOperation::Inject {
        return Ok(flags.0);
    }

    match fault {
        FaultName::Cpu | FaultName::Memory => flags.required(spec, "load")?,
        FaultName::DiskIo => {
            flags.required(spec, "targetDir")?;
            flags.required(spec, "ioSize")?;
        }
        FaultName::DiskSpace => {
            flags.required(spec, "targetDir")?;
            flags.optional(spec, "diskFillSize");
        }
        FaultName::NetworkDelay => {
            flags.required(spec, "nicName")?;
            flags.required(spec, "latency")?;
            flags.optional(spec, "jitter");
            flags.optional(spec, "destinationHosts");
        }
        FaultName::NetworkPacketLoss
        | FaultName::NetworkPacketCorruption
        | FaultName::NetworkPacketDuplication => {
            flags.required(spec, "nicName")?;
            flags.required(spec, "percentage")?;
            flags.optional(spec, "destinationHosts");
        }
        FaultName::FileHandlerLeak => flags.optional(spec, "fileHandlerCount"),
        FaultName::KillProcess => flags.required(spec, "processIdentifier")?,
        _ => {}
    }

    // Kill-process and kernel-panic are one-shot
    if !matches!(fault, FaultName::KillProcess | FaultName::KernelPanic) {
        flags.raw(format!("--timeout {}", spec.timeout_ms));
    }

    Ok(flags.0)
}

/// Full agent invocation for one operation
pub fn agent_command(
    base: &str,
    binary: &str,
    spec: &FaultSpec,
    fault: FaultName,
    operation: FaultOperation,
) -> Result<String> {
    let mut command = format!(
        "{}{} --operation {} --faultname {}",
        base,
        binary,
        operation.agent_operation(),
        agent_fault_name(fault)?
    );
    for flag in fault_flags(spec, fault, operation)? {
        command.push(' ');
        command.push_str(&flag);
    }
    Ok(command)
}
