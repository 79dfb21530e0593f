//! Tree-walking interpreter.
//!
//! One [`Interp`] lives for one invocation.  It borrows the linked program,
//! the scope store and the simulation state ([`Machine`]) and runs a block
//! to completion.  Every statement and loop iteration costs one step; an
//! invocation that exceeds the step budget faults instead of hanging the
//! scheduler.
//!
//! Device slots that were never provisioned are inert: reads return the
//! field's zero value and writes are dropped, so loops over all 160
//! addresses are safe.  Only an index outside 1..=160 faults.

use core::cmp::Ordering;
use core::fmt;

use log::{debug, trace};
use serde::Serialize;

use super::ast::{BinOp, BlockId, Expr, Object, Place, Stmt, UnaryOp};
use super::{Program, Rng, ScriptBinding, Scope, format};
use crate::app::ports::ConsolePort;
use crate::catalog::DeviceKind;
use crate::codec::MAX_LEVEL;
use crate::drivers::indicator::IndicatorBank;
use crate::error::{Fault, RegistryError};
use crate::registry::{self, MAX_ADDRESS, Registry, SlotRef};
use crate::timer::TimerBank;

/// Highest `usrN` event.
pub const USER_EVENTS: u8 = 8;

/// Upper bound (exclusive) of a pulse width override.
const MAX_PULSE_OVERRIDE: i32 = 8000;

// ═══════════════════════════════════════════════════════════════
//  Values
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Int(i32),
    Float(f32),
    Bool(bool),
    Str(String),
}

impl Default for Value {
    fn default() -> Self {
        Self::Int(0)
    }
}

impl Value {
    pub fn truthy(&self) -> bool {
        match self {
            Self::Int(v) => *v != 0,
            Self::Float(v) => *v != 0.0,
            Self::Bool(b) => *b,
            Self::Str(s) => !s.is_empty(),
        }
    }

    pub fn as_int(&self) -> Result<i32, Fault> {
        match self {
            Self::Int(v) => Ok(*v),
            Self::Float(v) => Ok(*v as i32),
            Self::Bool(b) => Ok(i32::from(*b)),
            Self::Str(_) => Err(Fault::TypeMismatch("string used as a number")),
        }
    }

    pub fn as_float(&self) -> Result<f32, Fault> {
        match self {
            Self::Float(v) => Ok(*v),
            other => other.as_int().map(|v| v as f32),
        }
    }

    fn is_float(&self) -> bool {
        matches!(self, Self::Float(_))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Str(s) => f.write_str(s),
        }
    }
}

fn unary(op: UnaryOp, v: Value) -> Result<Value, Fault> {
    Ok(match (op, v) {
        (UnaryOp::Not, v) => Value::Bool(!v.truthy()),
        (UnaryOp::Neg, Value::Float(f)) => Value::Float(-f),
        (UnaryOp::Neg, v) => Value::Int(v.as_int()?.wrapping_neg()),
        (UnaryOp::BitNot, v) => Value::Int(!v.as_int()?),
    })
}

pub(crate) fn binary(op: BinOp, a: &Value, b: &Value) -> Result<Value, Fault> {
    use BinOp::*;
    let float = a.is_float() || b.is_float();
    Ok(match op {
        Eq | Ne => {
            let equal = match (a, b) {
                (Value::Str(x), Value::Str(y)) => x == y,
                (Value::Str(_), _) | (_, Value::Str(_)) => false,
                _ if float => a.as_float()? == b.as_float()?,
                _ => a.as_int()? == b.as_int()?,
            };
            Value::Bool(equal == (op == Eq))
        }
        Lt | Le | Gt | Ge => {
            let ord = if float {
                a.as_float()?.partial_cmp(&b.as_float()?)
            } else {
                Some(a.as_int()?.cmp(&b.as_int()?))
            };
            Value::Bool(ord.is_some_and(|o| match op {
                Lt => o == Ordering::Less,
                Le => o != Ordering::Greater,
                Gt => o == Ordering::Greater,
                _ => o != Ordering::Less,
            }))
        }
        And => Value::Bool(a.truthy() && b.truthy()),
        Or => Value::Bool(a.truthy() || b.truthy()),
        Add | Sub | Mul | Div | Rem if float => {
            let (x, y) = (a.as_float()?, b.as_float()?);
            if matches!(op, Div | Rem) && y == 0.0 {
                return Err(Fault::DivisionByZero);
            }
            Value::Float(match op {
                Add => x + y,
                Sub => x - y,
                Mul => x * y,
                Div => x / y,
                _ => x % y,
            })
        }
        _ => {
            let (x, y) = (a.as_int()?, b.as_int()?);
            Value::Int(match op {
                Add => x.wrapping_add(y),
                Sub => x.wrapping_sub(y),
                Mul => x.wrapping_mul(y),
                Div | Rem if y == 0 => return Err(Fault::DivisionByZero),
                Div => x.wrapping_div(y),
                Rem => x.wrapping_rem(y),
                BitAnd => x & y,
                BitOr => x | y,
                BitXor => x ^ y,
                Shl => x.wrapping_shl(y as u32),
                _ => x.wrapping_shr(y as u32),
            })
        }
    })
}

// ═══════════════════════════════════════════════════════════════
//  Machine: the state a script can touch
// ═══════════════════════════════════════════════════════════════

/// Simulation state lent to one script invocation.
pub struct Machine<'a> {
    pub registry: &'a mut Registry,
    pub timers: &'a mut TimerBank,
    pub indicators: &'a mut IndicatorBank,
    pub console: &'a mut dyn ConsolePort,
    /// Session clock.
    pub now_ms: u64,
    /// Device bound to `this`.
    pub this: Option<SlotRef>,
    /// User events raised with `usr(n)`, in call order.
    pub raised: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Device(SlotRef),
    Led(u8),
    Timer(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeviceField {
    Alarm,
    Trouble,
    Enabled,
    Test,
    Led,
    Out(usize),
    Tbias,
    Pw(usize),
    Pcnt,
    Grp,
    Addr,
    IsModule,
    State,
    Model,
}

impl DeviceField {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "alarm" => Self::Alarm,
            "trouble" => Self::Trouble,
            "en" => Self::Enabled,
            "tst" => Self::Test,
            "led" => Self::Led,
            "out1" => Self::Out(0),
            "out2" => Self::Out(1),
            "out3" => Self::Out(2),
            "out5" => Self::Out(4),
            "tbias" => Self::Tbias,
            "pcnt" => Self::Pcnt,
            "grp" => Self::Grp,
            "addr" => Self::Addr,
            "is_module" => Self::IsModule,
            "state" => Self::State,
            "model" => Self::Model,
            other => {
                let slot = other.strip_prefix("pw")?.parse::<u8>().ok()?;
                Self::Pw(registry::override_slot(slot)?)
            }
        })
    }

    fn read_only_name(self) -> Option<&'static str> {
        match self {
            Self::Addr => Some("addr"),
            Self::IsModule => Some("is_module"),
            Self::State => Some("state"),
            Self::Model => Some("model"),
            _ => None,
        }
    }

    /// Value read from an unprovisioned slot.
    fn inert(self) -> Value {
        match self {
            Self::Enabled | Self::Test | Self::Led | Self::Out(_) => Value::Bool(false),
            Self::Model => Value::Str(String::new()),
            _ => Value::Int(0),
        }
    }
}

fn registry_fault(e: RegistryError) -> Fault {
    match e {
        RegistryError::TooManyGroups { .. } => Fault::TooManyGroups,
        RegistryError::InvalidGroup(g) => Fault::InvalidValue {
            field: "grp",
            value: i64::from(g),
        },
        RegistryError::AddressOutOfRange { address, .. } => Fault::AddressOutOfRange(i64::from(address)),
        RegistryError::Unprovisioned { address, .. } => Fault::AddressOutOfRange(i64::from(address)),
        RegistryError::UnknownModel { model, .. } => Fault::UnresolvedSymbol(model),
    }
}

fn ranged(v: &Value, field: &'static str, lo: i32, hi: i32) -> Result<i32, Fault> {
    let n = v.as_int()?;
    if (lo..=hi).contains(&n) {
        Ok(n)
    } else {
        Err(Fault::InvalidValue {
            field,
            value: i64::from(n),
        })
    }
}

fn arity(args: &[Value], n: usize, call: &'static str) -> Result<(), Fault> {
    if args.len() == n {
        Ok(())
    } else {
        Err(Fault::BadArguments(call))
    }
}

// ═══════════════════════════════════════════════════════════════
//  Interpreter
// ═══════════════════════════════════════════════════════════════

enum Flow {
    Normal,
    Break,
    Continue,
    Return,
    Jump(BlockId),
}

/// Resolved assignment location. Index expressions are evaluated once.
enum Loc<'p> {
    Var(&'p str),
    Field(Target, &'p str),
}

pub(super) struct Interp<'r, 'm, 'a> {
    pub(super) program: &'r Program,
    pub(super) scopes: &'r mut [Scope],
    pub(super) session: Option<BlockId>,
    pub(super) current: BlockId,
    pub(super) machine: &'m mut Machine<'a>,
    pub(super) rng: &'r mut Rng,
    pub(super) steps: u32,
    pub(super) budget: u32,
}

impl Interp<'_, '_, '_> {
    /// Run `entry`, following `goto` jumps until a block completes.
    pub(super) fn run(mut self, entry: BlockId) -> Result<(), Fault> {
        let program = self.program;
        let mut id = entry;
        loop {
            let Some(block) = program.block(id) else {
                return Ok(());
            };
            self.current = id;
            trace!("Script: running block {} ({})", id, block.binding);
            match self.exec_list(&block.script.body)? {
                Flow::Jump(next) => {
                    self.step()?;
                    id = next;
                }
                _ => return Ok(()),
            }
        }
    }

    fn step(&mut self) -> Result<(), Fault> {
        self.steps += 1;
        if self.steps > self.budget {
            Err(Fault::StepBudgetExhausted)
        } else {
            Ok(())
        }
    }

    // ── Statements ────────────────────────────────────────────

    fn exec_list(&mut self, stmts: &[Stmt]) -> Result<Flow, Fault> {
        for s in stmts {
            match self.exec(s)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&mut self, stmt: &Stmt) -> Result<Flow, Fault> {
        self.step()?;
        match stmt {
            Stmt::Var(decls) => {
                for (name, init) in decls {
                    if let Some(e) = init {
                        let v = self.eval(e)?;
                        *self.var_mut(name)? = v;
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Expr(e) => {
                self.eval(e)?;
                Ok(Flow::Normal)
            }
            Stmt::If {
                cond,
                then,
                otherwise,
            } => {
                if self.eval(cond)?.truthy() {
                    self.exec(then)
                } else if let Some(s) = otherwise {
                    self.exec(s)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Stmt::While { cond, body } => {
                while self.eval(cond)?.truthy() {
                    match self.exec(body)? {
                        Flow::Break => break,
                        Flow::Normal | Flow::Continue => {}
                        flow => return Ok(flow),
                    }
                    self.step()?;
                }
                Ok(Flow::Normal)
            }
            Stmt::For {
                init,
                cond,
                step,
                body,
            } => {
                if let Some(s) = init {
                    match self.exec(s)? {
                        Flow::Normal => {}
                        flow => return Ok(flow),
                    }
                }
                loop {
                    if let Some(c) = cond
                        && !self.eval(c)?.truthy()
                    {
                        break;
                    }
                    match self.exec(body)? {
                        Flow::Break => break,
                        Flow::Normal | Flow::Continue => {}
                        flow => return Ok(flow),
                    }
                    if let Some(e) = step {
                        self.eval(e)?;
                    }
                    self.step()?;
                }
                Ok(Flow::Normal)
            }
            Stmt::Block(stmts) => self.exec_list(stmts),
            Stmt::Break => Ok(Flow::Break),
            Stmt::Continue => Ok(Flow::Continue),
            Stmt::Return => Ok(Flow::Return),
            Stmt::Goto { label, target } => target
                .map(Flow::Jump)
                .ok_or_else(|| Fault::UnresolvedSymbol(label.clone())),
            Stmt::Empty => Ok(Flow::Normal),
        }
    }

    // ── Variables ─────────────────────────────────────────────

    fn var(&self, name: &str) -> Result<&Value, Fault> {
        if let Some(v) = self.scopes[self.current].get(name) {
            return Ok(v);
        }
        self.session
            .and_then(|s| self.scopes[s].get(name))
            .ok_or_else(|| Fault::UnresolvedSymbol(name.to_string()))
    }

    fn var_mut(&mut self, name: &str) -> Result<&mut Value, Fault> {
        let owner = if self.scopes[self.current].contains(name) {
            self.current
        } else {
            self.session
                .filter(|s| self.scopes[*s].contains(name))
                .ok_or_else(|| Fault::UnresolvedSymbol(name.to_string()))?
        };
        self.scopes[owner]
            .get_mut(name)
            .ok_or_else(|| Fault::UnresolvedSymbol(name.to_string()))
    }

    // ── Expressions ───────────────────────────────────────────

    fn eval(&mut self, expr: &Expr) -> Result<Value, Fault> {
        match expr {
            Expr::Int(v) => Ok(Value::Int(*v)),
            Expr::Float(v) => Ok(Value::Float(*v)),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::Var(name) => self.var(name).cloned(),
            Expr::Unary(op, e) => {
                let v = self.eval(e)?;
                unary(*op, v)
            }
            Expr::Binary(BinOp::And, a, b) => {
                let v = self.eval(a)?.truthy() && self.eval(b)?.truthy();
                Ok(Value::Bool(v))
            }
            Expr::Binary(BinOp::Or, a, b) => {
                let v = self.eval(a)?.truthy() || self.eval(b)?.truthy();
                Ok(Value::Bool(v))
            }
            Expr::Binary(op, a, b) => {
                let x = self.eval(a)?;
                let y = self.eval(b)?;
                binary(*op, &x, &y)
            }
            Expr::Assign { target, op, value } => {
                let loc = self.resolve(target)?;
                let v = self.eval(value)?;
                let new = match op {
                    None => v,
                    Some(op) => binary(*op, &self.load(&loc)?, &v)?,
                };
                self.store(&loc, &new)?;
                Ok(new)
            }
            Expr::IncDec {
                target,
                delta,
                prefix,
            } => {
                let loc = self.resolve(target)?;
                let old = self.load(&loc)?;
                let new = binary(BinOp::Add, &old, &Value::Int(*delta))?;
                self.store(&loc, &new)?;
                Ok(if *prefix { new } else { old })
            }
            Expr::Call { name, args } => {
                let args = self.eval_args(args)?;
                self.call(name, &args)
            }
            Expr::Field { object, field } => {
                let t = self.target(object)?;
                self.read_field(t, field)
            }
            Expr::Method {
                object,
                method,
                args,
            } => {
                let t = self.target(object)?;
                let args = self.eval_args(args)?;
                self.method(t, method, &args)
            }
        }
    }

    fn eval_args(&mut self, args: &[Expr]) -> Result<Vec<Value>, Fault> {
        args.iter().map(|a| self.eval(a)).collect()
    }

    fn resolve<'p>(&mut self, place: &'p Place) -> Result<Loc<'p>, Fault> {
        match place {
            Place::Var(name) => Ok(Loc::Var(name)),
            Place::Field { object, field } => Ok(Loc::Field(self.target(object)?, field)),
        }
    }

    fn load(&mut self, loc: &Loc<'_>) -> Result<Value, Fault> {
        match loc {
            Loc::Var(name) => self.var(name).cloned(),
            Loc::Field(t, field) => self.read_field(*t, field),
        }
    }

    fn store(&mut self, loc: &Loc<'_>, v: &Value) -> Result<(), Fault> {
        match loc {
            Loc::Var(name) => {
                *self.var_mut(name)? = v.clone();
                Ok(())
            }
            Loc::Field(t, field) => self.write_field(*t, field, v),
        }
    }

    fn target(&mut self, object: &Object) -> Result<Target, Fault> {
        match object {
            Object::Sensor(e) => Ok(Target::Device(SlotRef::sensor(self.address(e)?))),
            Object::Module(e) => Ok(Target::Device(SlotRef::module(self.address(e)?))),
            Object::Led(e) => {
                let id = i64::from(self.eval(e)?.as_int()?);
                if IndicatorBank::is_valid_id(id) {
                    Ok(Target::Led(id as u8))
                } else {
                    Err(Fault::BadIndicator(id))
                }
            }
            Object::Timer(e) => {
                let id = i64::from(self.eval(e)?.as_int()?);
                if TimerBank::is_valid_id(id) {
                    Ok(Target::Timer(id as u8))
                } else {
                    Err(Fault::BadTimer(id))
                }
            }
            Object::This => self.machine.this.map(Target::Device).ok_or(Fault::NoDevice),
        }
    }

    fn address(&mut self, e: &Expr) -> Result<u8, Fault> {
        let a = self.eval(e)?.as_int()?;
        u8::try_from(a)
            .ok()
            .filter(|a| (1..=MAX_ADDRESS).contains(a))
            .ok_or(Fault::AddressOutOfRange(i64::from(a)))
    }

    // ── Fields ────────────────────────────────────────────────

    fn read_field(&mut self, target: Target, name: &str) -> Result<Value, Fault> {
        match target {
            Target::Device(slot) => self.read_device(slot, name),
            Target::Led(id) => match name {
                "on" => Ok(Value::Bool(self.machine.indicators.is_on(id))),
                _ => Err(Fault::UnknownField(name.to_string())),
            },
            Target::Timer(id) => {
                let ms = self.machine.timers.remaining_ms(id);
                match name {
                    "ms" => Ok(Value::Int(ms.min(i32::MAX as u32) as i32)),
                    "sec" => Ok(Value::Int((ms.saturating_add(500) / 1000) as i32)),
                    _ => Err(Fault::UnknownField(name.to_string())),
                }
            }
        }
    }

    fn write_field(&mut self, target: Target, name: &str, v: &Value) -> Result<(), Fault> {
        match target {
            Target::Device(slot) => self.write_device(slot, name, v),
            Target::Led(id) => match name {
                "on" => {
                    self.machine.indicators.set_on(id, v.truthy());
                    Ok(())
                }
                _ => Err(Fault::UnknownField(name.to_string())),
            },
            Target::Timer(id) => {
                let (field, scale) = match name {
                    "ms" => ("ms", 1),
                    "sec" => ("sec", 1000),
                    _ => return Err(Fault::UnknownField(name.to_string())),
                };
                let n = ranged(v, field, 0, i32::MAX)? as u32;
                self.machine
                    .timers
                    .arm(id, n.saturating_mul(scale), ScriptBinding::Timer(id));
                Ok(())
            }
        }
    }

    fn read_device(&self, slot: SlotRef, name: &str) -> Result<Value, Fault> {
        let field = DeviceField::parse(name).ok_or_else(|| Fault::UnknownField(name.to_string()))?;
        match field {
            DeviceField::Addr => return Ok(Value::Int(i32::from(slot.address))),
            DeviceField::IsModule => return Ok(Value::Bool(slot.kind == DeviceKind::Module)),
            _ => {}
        }
        let Ok(dev) = self.machine.registry.get(slot.kind, u32::from(slot.address)) else {
            return Ok(field.inert());
        };
        Ok(match field {
            DeviceField::Alarm => Value::Int(i32::from(dev.alarm)),
            DeviceField::Trouble => Value::Int(i32::from(dev.trouble)),
            DeviceField::Enabled => Value::Bool(dev.enabled),
            DeviceField::Test => Value::Bool(dev.remote_test),
            DeviceField::Led => Value::Bool(dev.led),
            DeviceField::Out(i) => Value::Bool(dev.outputs[i]),
            DeviceField::Tbias => Value::Int(i32::from(dev.overrides.bias_pct)),
            DeviceField::Pw(i) => Value::Int(i32::from(dev.overrides.pw[i].unwrap_or(0))),
            DeviceField::Pcnt => Value::Int(dev.poll_count as i32),
            DeviceField::Grp => Value::Int(i32::from(dev.groups.first().copied().unwrap_or(0))),
            DeviceField::State => Value::Int(i32::from(dev.alarm > 0) | (i32::from(dev.trouble > 0) << 1)),
            DeviceField::Model => Value::Str(dev.model.name.clone()),
            DeviceField::Addr | DeviceField::IsModule => field.inert(),
        })
    }

    fn write_device(&mut self, slot: SlotRef, name: &str, v: &Value) -> Result<(), Fault> {
        let field = DeviceField::parse(name).ok_or_else(|| Fault::UnknownField(name.to_string()))?;
        if let Some(read_only) = field.read_only_name() {
            return Err(Fault::ReadOnly(read_only));
        }
        let (kind, address) = (slot.kind, u32::from(slot.address));
        let registry = &mut *self.machine.registry;
        if !registry.is_provisioned(kind, address) {
            debug!("Script: write to unprovisioned {} ignored", slot);
            return Ok(());
        }
        let level = |field| ranged(v, field, 0, i32::from(MAX_LEVEL)).map(|l| l as u8);
        match field {
            DeviceField::Alarm => {
                registry.set_alarm(kind, address, level("alarm")?, true).map_err(registry_fault)?;
            }
            DeviceField::Trouble => {
                registry
                    .set_trouble(kind, address, level("trouble")?, true)
                    .map_err(registry_fault)?;
            }
            DeviceField::Test => {
                registry
                    .set_remote_test(kind, address, v.truthy(), true)
                    .map_err(registry_fault)?;
            }
            DeviceField::Enabled => {
                registry.set_enabled(kind, address, v.truthy()).map_err(registry_fault)?;
            }
            DeviceField::Grp => {
                let g = ranged(v, "grp", 0, 255)?;
                registry.group_clear(kind, address).map_err(registry_fault)?;
                if g != 0 {
                    registry.group_insert(kind, address, g as u8).map_err(registry_fault)?;
                }
            }
            _ => {
                let dev = registry.get_mut(kind, address).map_err(registry_fault)?;
                match field {
                    DeviceField::Led => dev.led = v.truthy(),
                    DeviceField::Out(i) => dev.outputs[i] = v.truthy(),
                    DeviceField::Tbias => dev.overrides.bias_pct = ranged(v, "tbias", 1, 199)? as u8,
                    DeviceField::Pw(i) => {
                        let w = ranged(v, "pw", 0, MAX_PULSE_OVERRIDE - 1)? as u16;
                        dev.overrides.pw[i] = (w != 0).then_some(w);
                    }
                    DeviceField::Pcnt => dev.poll_count = ranged(v, "pcnt", 0, i32::MAX)? as u32,
                    _ => {}
                }
            }
        }
        Ok(())
    }

    // ── Methods and built-ins ─────────────────────────────────

    fn method(&mut self, target: Target, name: &str, args: &[Value]) -> Result<Value, Fault> {
        match (target, name) {
            (Target::Led(id), "flash") => {
                arity(args, 1, "flash")?;
                let period = ranged(&args[0], "flash", 0, i32::MAX)? as u32;
                self.machine.indicators.flash(id, period);
                Ok(Value::Int(0))
            }
            (Target::Device(slot), "grp_clear") => {
                arity(args, 0, "grp_clear")?;
                let (kind, address) = (slot.kind, u32::from(slot.address));
                if self.machine.registry.is_provisioned(kind, address) {
                    self.machine.registry.group_clear(kind, address).map_err(registry_fault)?;
                }
                Ok(Value::Int(0))
            }
            (Target::Device(slot), "grp_insert" | "grp_remove" | "belong") => {
                arity(args, 1, "group method")?;
                let g = ranged(&args[0], "grp", 1, 255)? as u8;
                let (kind, address) = (slot.kind, u32::from(slot.address));
                let registry = &mut *self.machine.registry;
                if !registry.is_provisioned(kind, address) {
                    return Ok(if name == "belong" { Value::Bool(false) } else { Value::Int(0) });
                }
                match name {
                    "grp_insert" => registry.group_insert(kind, address, g).map_err(registry_fault)?,
                    "grp_remove" => registry.group_remove(kind, address, g).map_err(registry_fault)?,
                    _ => {
                        let dev = registry.get(kind, address).map_err(registry_fault)?;
                        return Ok(Value::Bool(dev.in_group(g)));
                    }
                }
                Ok(Value::Int(0))
            }
            _ => Err(Fault::UnknownField(name.to_string())),
        }
    }

    fn call(&mut self, name: &str, args: &[Value]) -> Result<Value, Fault> {
        match name {
            "printf" => {
                let Some(Value::Str(fmt)) = args.first() else {
                    return Err(Fault::BadArguments("printf"));
                };
                let text = format::printf(fmt, &args[1..])?;
                self.machine.console.print(&text);
                Ok(Value::Int(text.len() as i32))
            }
            "print" => {
                let line = args.iter().map(Value::to_string).collect::<Vec<_>>().join(", ");
                self.machine.console.print(&line);
                self.machine.console.print("\n");
                Ok(Value::Int(0))
            }
            "time" => Ok(Value::Int((self.machine.now_ms / 1000) as i32)),
            "ticks" => Ok(Value::Int(self.machine.now_ms as i32)),
            "rand" => Ok(Value::Int((self.rng.next_u32() & 0x7fff_ffff) as i32)),
            "srand" => {
                arity(args, 1, "srand")?;
                self.rng.reseed(args[0].as_int()? as u32);
                Ok(Value::Int(0))
            }
            "sqrt" => {
                arity(args, 1, "sqrt")?;
                match &args[0] {
                    Value::Float(x) if *x >= 0.0 => Ok(Value::Float(x.sqrt())),
                    other => {
                        let x = ranged(other, "sqrt", 0, i32::MAX)? as u32;
                        Ok(Value::Int(x.isqrt() as i32))
                    }
                }
            }
            "log2" => {
                arity(args, 1, "log2")?;
                let x = ranged(&args[0], "log2", 1, i32::MAX)? as u32;
                Ok(Value::Int(x.ilog2() as i32))
            }
            "usr" => {
                arity(args, 1, "usr")?;
                let n = ranged(&args[0], "usr", 1, i32::from(USER_EVENTS))? as u8;
                self.machine.raised.push(n);
                Ok(Value::Int(0))
            }
            _ => Err(Fault::UnresolvedSymbol(name.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_arithmetic_wraps() {
        assert_eq!(
            binary(BinOp::Add, &Value::Int(i32::MAX), &Value::Int(1)),
            Ok(Value::Int(i32::MIN))
        );
        assert_eq!(binary(BinOp::Div, &Value::Int(7), &Value::Int(2)), Ok(Value::Int(3)));
        assert_eq!(binary(BinOp::Rem, &Value::Int(-7), &Value::Int(2)), Ok(Value::Int(-1)));
    }

    #[test]
    fn division_by_zero_faults() {
        assert_eq!(
            binary(BinOp::Div, &Value::Int(1), &Value::Int(0)),
            Err(Fault::DivisionByZero)
        );
        assert_eq!(
            binary(BinOp::Rem, &Value::Float(1.0), &Value::Int(0)),
            Err(Fault::DivisionByZero)
        );
    }

    #[test]
    fn mixed_arithmetic_promotes_to_float() {
        assert_eq!(binary(BinOp::Mul, &Value::Int(3), &Value::Float(0.5)), Ok(Value::Float(1.5)));
        assert_eq!(binary(BinOp::Lt, &Value::Int(1), &Value::Float(1.5)), Ok(Value::Bool(true)));
    }

    #[test]
    fn comparisons_and_strings() {
        assert_eq!(binary(BinOp::Eq, &Value::Bool(true), &Value::Int(1)), Ok(Value::Bool(true)));
        assert_eq!(
            binary(BinOp::Eq, &Value::Str("a".into()), &Value::Str("a".into())),
            Ok(Value::Bool(true))
        );
        assert_eq!(binary(BinOp::Ne, &Value::Str("a".into()), &Value::Int(0)), Ok(Value::Bool(true)));
        assert!(binary(BinOp::Add, &Value::Str("a".into()), &Value::Int(1)).is_err());
    }

    #[test]
    fn shifts_and_bits() {
        assert_eq!(binary(BinOp::Shl, &Value::Int(1), &Value::Int(4)), Ok(Value::Int(16)));
        assert_eq!(binary(BinOp::Shr, &Value::Int(-16), &Value::Int(2)), Ok(Value::Int(-4)));
        assert_eq!(unary(UnaryOp::BitNot, Value::Int(0)), Ok(Value::Int(-1)));
        assert_eq!(unary(UnaryOp::Not, Value::Int(5)), Ok(Value::Bool(false)));
    }

    #[test]
    fn device_field_names() {
        assert_eq!(DeviceField::parse("pw3"), Some(DeviceField::Pw(2)));
        assert_eq!(DeviceField::parse("pw6"), None);
        assert_eq!(DeviceField::parse("out5"), Some(DeviceField::Out(4)));
        assert_eq!(DeviceField::parse("out4"), None);
        assert_eq!(DeviceField::Addr.read_only_name(), Some("addr"));
    }
}
