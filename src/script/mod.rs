//! Event script runtime.
//!
//! Scripts are small C-like programs bound to simulator events.  Every
//! script source is parsed once at load time; the parsed blocks are then
//! linked into one [`Program`], a linear block table in which `goto label`
//! statements are resolved to block indices.
//!
//! ```text
//!   config / catalog ──parse()──▶ Script ──Program::build()──▶ [Block; N]
//!                                                                 │
//!   SimService ── Runtime::run(binding, machine) ─────────────────┘
//!                   │
//!                   ├── scope of the block (persists across runs)
//!                   └── session scope (variables declared by `init`)
//! ```
//!
//! Variables declared in a block persist between invocations of that
//! block.  A block that declares a name already declared by `init` shares
//! the session variable instead of shadowing it.

pub mod ast;
pub mod format;
pub mod interp;
pub mod lexer;
pub mod parser;

use std::collections::{HashMap, HashSet};
use std::fmt;

use log::{debug, info};

use crate::catalog::{Catalog, DeviceKind};
use crate::drivers::switch::SwitchPosition;
use crate::error::{CatalogError, ScriptError};
use crate::registry::SlotRef;

use self::ast::{BlockId, Stmt};
pub use self::interp::{Machine, USER_EVENTS, Value};
use self::interp::Interp;

// ═══════════════════════════════════════════════════════════════
//  Bindings
// ═══════════════════════════════════════════════════════════════

/// Event a script block is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScriptBinding {
    Init,
    Timer(u8),
    UserEvent(u8),
    SwitchEdge { switch: u8, edge: SwitchPosition },
    Trigger(SlotRef),
    /// Command sequence `index` of a catalog model.
    Command {
        kind: DeviceKind,
        model: String,
        index: usize,
    },
    /// Block reachable only through `goto`.
    Named(String),
}

impl fmt::Display for ScriptBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "init"),
            Self::Timer(id) => write!(f, "tmr{id}"),
            Self::UserEvent(n) => write!(f, "usr{n}"),
            Self::SwitchEdge { switch, edge } => write!(f, "sw{switch}.{edge}"),
            Self::Trigger(slot) => write!(f, "trigger {slot}"),
            Self::Command { kind, model, index } => write!(f, "{kind} '{model}' cmd {index}"),
            Self::Named(label) => write!(f, "script '{label}'"),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Parsed scripts
// ═══════════════════════════════════════════════════════════════

/// One parsed script.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Script {
    body: Vec<Stmt>,
    locals: Vec<String>,
}

impl Script {
    /// Variable names declared anywhere in the script, in order.
    pub fn locals(&self) -> &[String] {
        &self.locals
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

/// Parse a script source.
pub fn parse(source: &str) -> Result<Script, ScriptError> {
    let parsed = parser::parse_source(source)?;
    Ok(Script {
        body: parsed.body,
        locals: parsed.locals,
    })
}

// ═══════════════════════════════════════════════════════════════
//  Program: the linked block table
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct Block {
    pub binding: ScriptBinding,
    pub script: Script,
}

#[derive(Debug, Clone, Default)]
pub struct Program {
    blocks: Vec<Block>,
    index: HashMap<ScriptBinding, BlockId>,
}

impl Program {
    /// Link config scripts and the catalog's command scripts into one
    /// table. A later script for the same binding replaces the earlier one.
    pub fn build(
        scripts: impl IntoIterator<Item = (ScriptBinding, Script)>,
        catalog: &Catalog,
    ) -> Result<Self, CatalogError> {
        let mut program = Self::default();
        for (binding, script) in scripts {
            program.bind(binding, script);
        }
        for model in catalog.models() {
            for (index, cmd) in model.commands.iter().enumerate() {
                program.bind(
                    ScriptBinding::Command {
                        kind: model.kind,
                        model: model.name.clone(),
                        index,
                    },
                    cmd.script.clone(),
                );
            }
        }
        program.link()?;
        info!("Script: linked {} blocks", program.blocks.len());
        Ok(program)
    }

    fn bind(&mut self, binding: ScriptBinding, script: Script) {
        match self.index.get(&binding) {
            Some(&id) => {
                debug!("Script: {} redefined, last definition wins", binding);
                self.blocks[id].script = script;
            }
            None => {
                self.index.insert(binding.clone(), self.blocks.len());
                self.blocks.push(Block { binding, script });
            }
        }
    }

    fn link(&mut self) -> Result<(), CatalogError> {
        let labels: HashMap<String, BlockId> = self
            .blocks
            .iter()
            .enumerate()
            .filter_map(|(id, b)| match &b.binding {
                ScriptBinding::Named(label) => Some((label.clone(), id)),
                _ => None,
            })
            .collect();
        for block in &mut self.blocks {
            for stmt in &mut block.script.body {
                stmt.for_each_goto(&mut |label, target| match labels.get(label) {
                    Some(id) => {
                        *target = Some(*id);
                        Ok(())
                    }
                    None => Err(CatalogError::UnresolvedLabel {
                        context: block.binding.to_string(),
                        label: label.to_string(),
                    }),
                })?;
            }
        }
        Ok(())
    }

    pub fn lookup(&self, binding: &ScriptBinding) -> Option<BlockId> {
        self.index.get(binding).copied()
    }

    pub fn contains(&self, binding: &ScriptBinding) -> bool {
        self.index.contains_key(binding)
    }

    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(id)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn bindings(&self) -> impl Iterator<Item = &ScriptBinding> {
        self.blocks.iter().map(|b| &b.binding)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Runtime
// ═══════════════════════════════════════════════════════════════

/// Variables of one block.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    vars: HashMap<String, Value>,
}

impl Scope {
    fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.vars.get_mut(name)
    }

    fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }
}

/// xorshift32 generator behind `rand()`.
#[derive(Debug, Clone)]
pub(crate) struct Rng(u32);

impl Rng {
    fn new(seed: u32) -> Self {
        let mut rng = Self(0);
        rng.reseed(seed);
        rng
    }

    pub(crate) fn reseed(&mut self, seed: u32) {
        self.0 = if seed == 0 { 0x2545_f491 } else { seed };
    }

    pub(crate) fn next_u32(&mut self) -> u32 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.0 = x;
        x
    }
}

/// Linked program plus its persistent variable store.
#[derive(Debug, Clone)]
pub struct Runtime {
    program: Program,
    scopes: Vec<Scope>,
    rng: Rng,
    seed: u32,
    step_budget: u32,
}

impl Runtime {
    pub fn new(program: Program, step_budget: u32, seed: u32) -> Self {
        let mut rt = Self {
            program,
            scopes: Vec::new(),
            rng: Rng::new(seed),
            seed,
            step_budget,
        };
        rt.reset();
        rt
    }

    /// Zero every variable and reseed `rand()`.
    pub fn reset(&mut self) {
        let session = self.program.lookup(&ScriptBinding::Init);
        let shared: HashSet<&str> = session
            .and_then(|id| self.program.block(id))
            .map(|b| b.script.locals.iter().map(String::as_str).collect())
            .unwrap_or_default();
        self.scopes = self
            .program
            .blocks
            .iter()
            .enumerate()
            .map(|(id, block)| Scope {
                vars: block
                    .script
                    .locals
                    .iter()
                    .filter(|name| Some(id) == session || !shared.contains(name.as_str()))
                    .map(|name| (name.clone(), Value::default()))
                    .collect(),
            })
            .collect();
        self.rng.reseed(self.seed);
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn has(&self, binding: &ScriptBinding) -> bool {
        self.program.contains(binding)
    }

    /// Run the block bound to `binding`. `Ok(false)` when nothing is bound.
    pub fn run(&mut self, binding: &ScriptBinding, machine: &mut Machine<'_>) -> Result<bool, ScriptError> {
        let Some(entry) = self.program.lookup(binding) else {
            return Ok(false);
        };
        let interp = Interp {
            program: &self.program,
            scopes: &mut self.scopes,
            session: self.program.lookup(&ScriptBinding::Init),
            current: entry,
            machine,
            rng: &mut self.rng,
            steps: 0,
            budget: self.step_budget,
        };
        interp.run(entry)?;
        Ok(true)
    }

    /// Current value of `name` as seen by the block bound to `binding`.
    pub fn variable(&self, binding: &ScriptBinding, name: &str) -> Option<&Value> {
        let id = self.program.lookup(binding)?;
        self.scopes.get(id)?.get(name).or_else(|| {
            let session = self.program.lookup(&ScriptBinding::Init)?;
            self.scopes.get(session)?.get(name)
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
