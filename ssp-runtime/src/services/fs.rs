//! The built-in `fs` service (spec.md §4.6's supplemented contract),
//! grounded on `original_source/ssp/server/universe/machine_services/fs.py`.
//!
//! The distilled spec's Non-goals exclude "the filesystem service...
//! implementation beyond their IPC contract" — read narrowly, that rules
//! out persistence/durability, not the in-memory command contract itself,
//! which SPEC_FULL.md §4.6 keeps in scope as a demonstration built-in
//! service and exercise of the IPC dispatch path.

use std::collections::HashMap;

use ssp_vm::Value;

use crate::process::Endpoint;

const RET_OKAY: i64 = 0;
const RET_BAD_CMD: i64 = 1;
const RET_BAD_PARAMS: i64 = 2;
const RET_BAD_PATH: i64 = 3;
const RET_ALREADY_OPEN: i64 = 4;
const RET_BAD_HANDLE: i64 = 5;

/// A flat in-memory file store keyed by path. `fs.py`'s `FileSystem`
/// walks a `Folder`/`File` tree to resolve nested paths; the full-path
/// hierarchy is outside this demonstration service's IPC contract (see
/// module doc), so paths are treated as opaque flat keys here — `open`,
/// `write`, `read`, `close` still behave per the original's state machine
/// (an open file may not be reopened; `mode == "w"` creates missing
/// files, any other mode requires the file to already exist).
struct FileSystem {
    files: HashMap<String, Option<Value>>,
    open: std::collections::HashSet<String>,
}

impl FileSystem {
    fn new() -> Self {
        FileSystem {
            files: HashMap::new(),
            open: std::collections::HashSet::new(),
        }
    }

    fn open(&mut self, filepath: &str, mode: &str) -> Result<(), i64> {
        if self.open.contains(filepath) {
            return Err(RET_ALREADY_OPEN);
        }
        if !self.files.contains_key(filepath) {
            if mode != "w" {
                return Err(RET_BAD_PATH);
            }
            self.files.insert(filepath.to_string(), None);
        }
        self.open.insert(filepath.to_string());
        Ok(())
    }

    fn write_file(&mut self, filepath: &str, data: Value) {
        self.files.insert(filepath.to_string(), Some(data));
    }

    fn read_file(&self, filepath: &str) -> Option<Value> {
        self.files.get(filepath).cloned().flatten()
    }

    fn close(&mut self, filepath: &str) -> bool {
        self.open.remove(filepath)
    }
}

/// Per-sender file handle table, mirroring `ProcessHandles`'s free-listed
/// `IdList` with a plain `Vec<Option<String>>` (handles are small-integer
/// indices into this process's own open-file list, reused on close).
#[derive(Default)]
struct ProcessHandles {
    slots: Vec<Option<String>>,
}

impl ProcessHandles {
    fn new_handle_for(&mut self, filepath: String) -> i64 {
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(filepath);
                return i as i64;
            }
        }
        self.slots.push(Some(filepath));
        (self.slots.len() - 1) as i64
    }

    fn is_valid(&self, handle: i64) -> bool {
        handle >= 0 && (handle as usize) < self.slots.len() && self.slots[handle as usize].is_some()
    }

    fn lookup(&self, handle: i64) -> Option<&str> {
        self.slots.get(handle as usize).and_then(|s| s.as_deref())
    }

    fn close(&mut self, handle: i64) {
        if let Some(slot) = self.slots.get_mut(handle as usize) {
            *slot = None;
        }
    }
}

pub struct FsService {
    pid: i64,
    filesystem: FileSystem,
    handles: HashMap<String, ProcessHandles>,
    /// Set by `deliver`, read by a caller polling for the synchronous
    /// reply a service always produces inline.
    last_reply: Option<Vec<Value>>,
}

impl FsService {
    pub fn new(pid: i64) -> Self {
        FsService {
            pid,
            filesystem: FileSystem::new(),
            handles: HashMap::new(),
            last_reply: None,
        }
    }

    pub fn last_reply(&self) -> Option<&[Value]> {
        self.last_reply.as_deref()
    }

    fn handle_command(&mut self, sender: &str, values: Vec<Value>) -> Vec<Value> {
        let mut iter = values.into_iter();
        let cmd = iter.next();
        let args: Vec<Value> = iter.collect();

        let cmd = match cmd.as_ref().and_then(Value::as_str) {
            Some(c) => c.to_lowercase(),
            None => return vec![Value::Int(RET_BAD_CMD)],
        };

        match cmd.as_str() {
            "open" => self.open(sender, args),
            "write" => self.write(sender, args),
            "read" => self.read(sender, args),
            "close" => self.close(sender, args),
            _ => vec![Value::Int(RET_BAD_CMD)],
        }
    }

    fn open(&mut self, sender: &str, args: Vec<Value>) -> Vec<Value> {
        if args.len() != 2 {
            return vec![Value::Int(-1), Value::Int(RET_BAD_PARAMS)];
        }
        let filepath = match args[0].as_str() {
            Some(p) => p.to_string(),
            None => return vec![Value::Int(-1), Value::Int(RET_BAD_PARAMS)],
        };
        let mode = match args[1].as_str() {
            Some(m) => m.to_string(),
            None => return vec![Value::Int(-1), Value::Int(RET_BAD_PARAMS)],
        };

        match self.filesystem.open(&filepath, &mode) {
            Ok(()) => {
                let handles = self.handles.entry(sender.to_string()).or_default();
                let handle = handles.new_handle_for(filepath);
                vec![Value::Int(handle), Value::Int(RET_OKAY)]
            }
            Err(code) => vec![Value::Int(-1), Value::Int(code)],
        }
    }

    fn write(&mut self, sender: &str, args: Vec<Value>) -> Vec<Value> {
        if args.len() != 2 {
            return vec![Value::Int(-1), Value::Int(RET_BAD_PARAMS)];
        }
        let handle = match args[0].as_i64() {
            Some(h) => h,
            None => return vec![Value::Int(-1), Value::Int(RET_BAD_PARAMS)],
        };
        let data = args[1].clone();

        let filepath = match self.handles.get(sender).filter(|h| h.is_valid(handle)) {
            Some(h) => h.lookup(handle).unwrap().to_string(),
            None => return vec![Value::Int(-1), Value::Int(RET_BAD_HANDLE)],
        };
        self.filesystem.write_file(&filepath, data);
        vec![Value::Int(RET_OKAY)]
    }

    fn read(&mut self, sender: &str, args: Vec<Value>) -> Vec<Value> {
        if args.len() != 1 {
            return vec![Value::Int(-1), Value::Int(RET_BAD_PARAMS)];
        }
        let handle = match args[0].as_i64() {
            Some(h) => h,
            None => return vec![Value::Int(-1), Value::Int(RET_BAD_PARAMS)],
        };
        let filepath = match self.handles.get(sender).filter(|h| h.is_valid(handle)) {
            Some(h) => h.lookup(handle).unwrap().to_string(),
            None => return vec![Value::Int(-1), Value::Int(RET_BAD_HANDLE)],
        };
        match self.filesystem.read_file(&filepath) {
            Some(content) => vec![content, Value::Int(RET_OKAY)],
            None => vec![Value::Int(-1), Value::Int(RET_OKAY)],
        }
    }

    fn close(&mut self, sender: &str, args: Vec<Value>) -> Vec<Value> {
        if args.len() != 1 {
            return vec![Value::Int(-1), Value::Int(RET_BAD_PARAMS)];
        }
        let handle = match args[0].as_i64() {
            Some(h) => h,
            None => return vec![Value::Int(-1), Value::Int(RET_BAD_PARAMS)],
        };
        if let Some(handles) = self.handles.get_mut(sender) {
            if let Some(filepath) = handles.lookup(handle).map(|s| s.to_string()) {
                self.filesystem.close(&filepath);
                handles.close(handle);
                return vec![Value::Int(RET_OKAY)];
            }
        }
        vec![Value::Int(-1), Value::Int(RET_BAD_HANDLE)]
    }
}

impl Endpoint for FsService {
    fn pid(&self) -> i64 {
        self.pid
    }

    fn ppid(&self) -> Option<i64> {
        None
    }

    fn deliver(&mut self, sender: &str, values: Vec<Value>) -> bool {
        let reply = self.handle_command(sender, values);
        self.last_reply = Some(reply);
        true
    }

    fn take_reply(&mut self) -> Option<Vec<Value>> {
        self.last_reply.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_write_read_round_trip() {
        let mut svc = FsService::new(2000);
        svc.deliver("1000", vec![Value::Str("open".into()), Value::Str("hello.txt".into()), Value::Str("w".into())]);
        let reply = svc.last_reply().unwrap().to_vec();
        assert_eq!(reply[1], Value::Int(RET_OKAY));
        let handle = reply[0].clone();

        svc.deliver("1000", vec![Value::Str("write".into()), handle.clone(), Value::Str("hi".into())]);
        assert_eq!(svc.last_reply().unwrap()[0], Value::Int(RET_OKAY));

        svc.deliver("1000", vec![Value::Str("read".into()), handle]);
        let reply = svc.last_reply().unwrap();
        assert_eq!(reply[0], Value::Str("hi".into()));
    }

    #[test]
    fn unknown_command_is_bad_cmd() {
        let mut svc = FsService::new(2000);
        svc.deliver("1000", vec![Value::Str("frobnicate".into())]);
        assert_eq!(svc.last_reply().unwrap()[0], Value::Int(RET_BAD_CMD));
    }

    #[test]
    fn read_with_unopened_handle_is_bad_handle() {
        let mut svc = FsService::new(2000);
        svc.deliver("1000", vec![Value::Str("read".into()), Value::Int(99)]);
        assert_eq!(svc.last_reply().unwrap()[1], Value::Int(RET_BAD_HANDLE));
    }
}
