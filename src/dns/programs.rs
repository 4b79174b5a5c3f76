//! Per-process DNS evaluation programs
//!
//! A pid maps to a program id through the flow state; the id selects one
//! handler here. Dispatch is a plain table lookup. An id with no handler
//! behaves like a failed tail call and leaves the verdict to the caller.

use super::name::DnsQuestion;
use crate::pipeline::Verdict;
use crate::{NetsiftError, Result};
use netsift_common::{dns::PROGRAM_TABLE_ENTRIES, ConnTuple, DnsName};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Inputs handed to a DNS program
#[derive(Debug, Clone, Copy)]
pub struct DnsEvalContext<'a> {
    pub pid: u32,
    pub tup: &'a ConnTuple,
    pub question: &'a DnsQuestion,
}

pub type DnsProgram = Box<dyn Fn(&DnsEvalContext<'_>) -> Verdict + Send + Sync>;

pub struct DnsProgramTable {
    programs: HashMap<u32, DnsProgram>,
}

impl DnsProgramTable {
    pub fn new() -> Self {
        Self {
            programs: HashMap::new(),
        }
    }

    /// Install `program` under `id`, replacing any previous handler
    pub fn register(&mut self, id: u32, program: DnsProgram) -> Result<()> {
        if !self.programs.contains_key(&id) && self.programs.len() >= PROGRAM_TABLE_ENTRIES as usize
        {
            return Err(NetsiftError::Config(format!(
                "DNS program table holds at most {} programs",
                PROGRAM_TABLE_ENTRIES
            )));
        }
        self.programs.insert(id, program);
        Ok(())
    }

    pub fn contains(&self, id: u32) -> bool {
        self.programs.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    /// Run program `id`, or `None` when nothing is installed there
    pub fn dispatch(&self, id: u32, ctx: &DnsEvalContext<'_>) -> Option<Verdict> {
        self.programs.get(&id).map(|program| program(ctx))
    }
}

impl Default for DnsProgramTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DnsProgramTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<_> = self.programs.keys().collect();
        ids.sort_unstable();
        f.debug_struct("DnsProgramTable").field("ids", &ids).finish()
    }
}

/// Accept queries for the listed names, drop everything else
pub fn allow_list(names: impl IntoIterator<Item = DnsName>) -> DnsProgram {
    let allowed: HashSet<DnsName> = names.into_iter().collect();
    Box::new(move |ctx: &DnsEvalContext<'_>| {
        if allowed.contains(&ctx.question.name) {
            Verdict::Accept
        } else {
            Verdict::Drop
        }
    })
}
