//! Built-in, non-emulated processes (spec.md's "Service" glossary entry),
//! grounded on `original_source/ssp/server/universe/machine_services/`.

pub mod fs;

use crate::process::Endpoint;

/// An ephemeral process occupying a pid purely so some other process has
/// somewhere to address a `"."` send, per spec.md's "Interface process"
/// glossary entry. `start_process` mints one as a throwaway parent;
/// `Machine::interface_send` (not yet wired to an external transport,
/// which is out of scope) would mint one to receive a reply on behalf of
/// a caller outside the process-addressing space entirely.
///
/// `original_source` does not ship `machine_services/interface.py` in the
/// retrieved corpus, so this is authored directly from the glossary
/// description and from how `machine.py`'s `start_process`/`interface_send`
/// use the type they import.
pub struct InterfaceService {
    pid: i64,
    last_message: Option<(String, Vec<ssp_vm::Value>)>,
}

impl InterfaceService {
    pub fn new(pid: i64) -> Self {
        InterfaceService {
            pid,
            last_message: None,
        }
    }

    /// The most recent message delivered to this interface, if any —
    /// exposed so a caller can poll for a synchronous-looking reply
    /// before the interface process is torn down.
    pub fn last_message(&self) -> Option<&(String, Vec<ssp_vm::Value>)> {
        self.last_message.as_ref()
    }
}

impl Endpoint for InterfaceService {
    fn pid(&self) -> i64 {
        self.pid
    }

    fn ppid(&self) -> Option<i64> {
        None
    }

    fn deliver(&mut self, sender: &str, values: Vec<ssp_vm::Value>) -> bool {
        self.last_message = Some((sender.to_string(), values));
        true
    }
}
