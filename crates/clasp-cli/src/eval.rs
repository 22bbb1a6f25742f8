//! The Clasp abstract machine.
//!
//! Evaluation is a step-driven tree walk over an explicit layer stack and
//! an explicit heap: every continuation lives in a layer's `pc` and
//! `local` fields, never on the host call stack, so a machine can be
//! suspended between steps, cloned, and resumed. The heap is a growable
//! array of tagged values addressed by index, which is what lets the
//! mark-sweep-compact collector move live values and rewrite every stored
//! index afterwards.

use crate::intrinsics::Io;
use clasp_analysis::{analyze, SemaError};
use clasp_ast::ast::{Ast, ExprId, ExprKind};
use clasp_ast::span::SourceLocation;
use clasp_ast::strings;
use clasp_parse::{parse_str, SyntaxError};
use std::collections::HashMap;
use std::fmt;

/// Heap index. The only way any part of the machine refers to a value:
/// variable bindings, collected sub-results, and intrinsic arguments are
/// all locations. Raw pointers would break under the moving collector.
pub type Location = usize;

/// Runtime values. Immutable once placed in the heap, with one exception:
/// letrec overwrites its freshly reserved cells to tie the recursive knot.
///
/// Strings are raw byte sequences, not UTF-8 text: `.getchar` stores the
/// exact byte read, `.putstr` writes bytes unchanged, and the string
/// intrinsics count, slice, and compare bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Void,
    Int(i64),
    Str(Vec<u8>),
    Closure(Closure),
}

/// A function value: the defining lambda plus the captured part of the
/// environment it was created in.
#[derive(Debug, Clone, PartialEq)]
pub struct Closure {
    pub env: Env,
    pub lambda: ExprId,
}

/// Variable environment; newer bindings sit at larger indices.
pub type Env = Vec<(String, Location)>;

/// Newest-first lookup, so inner bindings shadow outer ones.
fn lookup(env: &Env, name: &str) -> Option<Location> {
    env.iter()
        .rev()
        .find(|(n, _)| n == name)
        .map(|&(_, loc)| loc)
}

/// A runtime failure, carrying the source location of the failing node
/// and the locations of the call frames that were active, innermost last.
#[derive(Debug, Clone)]
pub struct RuntimeError {
    pub msg: String,
    pub sl: SourceLocation,
    pub trace: Vec<SourceLocation>,
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[runtime error {}] {}", self.sl, self.msg)
    }
}

impl std::error::Error for RuntimeError {}

/// Any failure the machine can produce. `.eval` re-enters the whole
/// pipeline at runtime, so syntax and sema failures flow through here too.
#[derive(Debug, Clone)]
pub enum EvalError {
    Syntax(SyntaxError),
    Sema(SemaError),
    Runtime(RuntimeError),
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalError::Syntax(e) => write!(f, "{e}"),
            EvalError::Sema(e) => write!(f, "{e}"),
            EvalError::Runtime(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for EvalError {}

impl From<SyntaxError> for EvalError {
    fn from(e: SyntaxError) -> Self {
        EvalError::Syntax(e)
    }
}

impl From<SemaError> for EvalError {
    fn from(e: SemaError) -> Self {
        EvalError::Sema(e)
    }
}

/// One in-progress node evaluation on the control stack.
///
/// A frame layer (a function-call boundary, plus the main sentinel) owns
/// the environment for its whole call; descendant non-frame layers carry
/// the stack index of that owner instead of sharing a pointer. That keeps
/// `State` a plain value: cloning it clones everything, and the collector
/// can treat each environment exactly once.
#[derive(Debug, Clone)]
struct Layer {
    /// Node being evaluated; `None` marks the main sentinel.
    expr: Option<ExprId>,
    frame: bool,
    /// Stack index of the frame whose environment this layer uses.
    /// Frames point at themselves.
    owner: usize,
    /// Only meaningful on frame layers.
    env: Env,
    /// Progress cursor through this node's sub-evaluations.
    pc: usize,
    /// Sub-results collected so far.
    local: Vec<Location>,
}

fn push_child(stack: &mut Vec<Layer>, expr: ExprId, owner: usize) {
    stack.push(Layer {
        expr: Some(expr),
        frame: false,
        owner,
        env: Vec::new(),
        pc: 0,
        local: Vec::new(),
    });
}

/// The whole machine: AST arena, control stack, heap, and bookkeeping.
///
/// `State` is `Clone` (a deep copy sharing nothing with the original) and
/// moves like any Rust value, so a host can snapshot an execution and
/// explore it speculatively.
#[derive(Debug, Clone)]
pub struct State {
    pub(crate) ast: Ast,
    stack: Vec<Layer>,
    pub(crate) heap: Vec<Value>,
    /// Pre-allocated literal location per arena node.
    literals: Vec<Option<Location>>,
    /// Locations `[0, num_literals)` are immortal and never move.
    num_literals: usize,
    /// Location of the most recent completed sub-evaluation.
    result: Option<Location>,
}

impl State {
    /// Parse, analyze, pre-allocate literals, and prime the stack with the
    /// main sentinel frame and the root expression.
    pub fn new(source: &str) -> Result<Self, EvalError> {
        let mut ast = parse_str(source)?;
        analyze(&mut ast)?;

        let mut heap = Vec::new();
        let mut literals = vec![None; ast.len()];
        for id in ast.ids() {
            match &ast.node(id).kind {
                ExprKind::Int(v) => {
                    literals[id.index()] = Some(heap.len());
                    heap.push(Value::Int(*v));
                }
                ExprKind::Str(raw) => {
                    // the lexer has validated the escapes already
                    let s = strings::unquote(raw.as_bytes()).map_err(|e| {
                        EvalError::Runtime(RuntimeError {
                            msg: e.to_string(),
                            sl: ast.node(id).sl,
                            trace: Vec::new(),
                        })
                    })?;
                    literals[id.index()] = Some(heap.len());
                    heap.push(Value::Str(s));
                }
                _ => {}
            }
        }
        let num_literals = heap.len();

        let root = ast.root();
        let stack = vec![
            Layer {
                expr: None,
                frame: true,
                owner: 0,
                env: Vec::new(),
                pc: 0,
                local: Vec::new(),
            },
            Layer {
                expr: Some(root),
                frame: false,
                owner: 0,
                env: Vec::new(),
                pc: 0,
                local: Vec::new(),
            },
        ];

        Ok(State {
            ast,
            stack,
            heap,
            literals,
            num_literals,
            result: None,
        })
    }

    pub fn ast(&self) -> &Ast {
        &self.ast
    }

    pub fn heap_size(&self) -> usize {
        self.heap.len()
    }

    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    /// The final value, once `step` has returned false.
    pub fn result_value(&self) -> Option<&Value> {
        self.result.map(|loc| &self.heap[loc])
    }

    /// Printed form of the value at `loc`: `<void>`, a decimal integer, a
    /// re-quoted string, or `<closure evaluated at (SourceLocation L C)>`.
    ///
    /// String bytes that are not valid UTF-8 render as U+FFFD here; only
    /// this display path decodes, the intrinsics stay byte-exact.
    pub fn render_value(&self, loc: Location) -> String {
        match &self.heap[loc] {
            Value::Void => "<void>".to_string(),
            Value::Int(v) => v.to_string(),
            Value::Str(s) => String::from_utf8_lossy(&strings::quote(s)).into_owned(),
            Value::Closure(c) => {
                format!("<closure evaluated at {}>", self.ast.node(c.lambda).sl)
            }
        }
    }

    pub fn render_result(&self) -> Option<String> {
        self.result.map(|loc| self.render_value(loc))
    }

    /// Source locations of the active call frames, innermost last. The
    /// main sentinel reports the start of the program.
    pub fn frame_locations(&self) -> Vec<SourceLocation> {
        self.stack
            .iter()
            .filter(|l| l.frame)
            .map(|l| match l.expr {
                Some(id) => self.ast.node(id).sl,
                None => SourceLocation::START,
            })
            .collect()
    }

    pub(crate) fn runtime_error(
        &self,
        msg: impl Into<String>,
        sl: SourceLocation,
    ) -> EvalError {
        EvalError::Runtime(RuntimeError {
            msg: msg.into(),
            sl,
            trace: self.frame_locations(),
        })
    }

    fn result_loc(&self, sl: SourceLocation) -> Result<Location, EvalError> {
        self.result
            .ok_or_else(|| self.runtime_error("internal: no pending result", sl))
    }

    /// Run to completion, collecting garbage whenever the heap outgrows
    /// the current threshold. The threshold starts just above the
    /// immortal literals and resets to twice the live count after each
    /// collection.
    pub fn execute(&mut self, io: &mut dyn Io) -> Result<(), EvalError> {
        let mut gc_threshold = self.num_literals + 64;
        while self.step(io)? {
            if self.heap.len() > gc_threshold {
                let live = self.collect_garbage();
                gc_threshold = live * 2;
            }
        }
        Ok(())
    }

    /// Advance the evaluation of the top layer by one step. Returns false
    /// exactly when the main sentinel is all that remains.
    pub fn step(&mut self, io: &mut dyn Io) -> Result<bool, EvalError> {
        let top = self.stack.len() - 1;
        let Some(expr) = self.stack[top].expr else {
            return Ok(false);
        };
        let sl = self.ast.node(expr).sl;
        let owner = self.stack[top].owner;
        let pc = self.stack[top].pc;

        match &self.ast.node(expr).kind {
            ExprKind::Int(_) | ExprKind::Str(_) => {
                let Some(loc) = self.literals[expr.index()] else {
                    return Err(self.runtime_error("internal: literal not pre-allocated", sl));
                };
                self.result = Some(loc);
                self.stack.pop();
            }

            ExprKind::Var(name) => {
                let Some(loc) = lookup(&self.stack[owner].env, name) else {
                    return Err(self.runtime_error(format!("undefined variable {name}"), sl));
                };
                self.result = Some(loc);
                self.stack.pop();
            }

            ExprKind::Lambda { .. } => {
                // capture only the bindings the body can actually reach,
                // newest-first so shadowed bindings are skipped
                let mut remaining = self.ast.node(expr).free_vars.clone();
                let mut captured: Env = Vec::new();
                for (name, loc) in self.stack[owner].env.iter().rev() {
                    if remaining.is_empty() {
                        break;
                    }
                    if remaining.remove(name) {
                        captured.push((name.clone(), *loc));
                    }
                }
                captured.reverse();
                let loc = self.heap.len();
                self.heap.push(Value::Closure(Closure {
                    env: captured,
                    lambda: expr,
                }));
                self.result = Some(loc);
                self.stack.pop();
            }

            ExprKind::Letrec { bindings, body } => {
                let n = bindings.len();
                // tie the knot: copy the just-finished binding value into
                // its pre-reserved cell (the one permitted heap mutation)
                if pc > 1 && pc <= n + 1 {
                    let name = &bindings[pc - 2].name.text;
                    let Some(dst) = lookup(&self.stack[owner].env, name) else {
                        return Err(
                            self.runtime_error(format!("undefined variable {name}"), sl)
                        );
                    };
                    let src = self.result_loc(sl)?;
                    let value = self.heap[src].clone();
                    self.heap[dst] = value;
                }
                if pc == 0 {
                    // reserve one Void cell per binding on the frame's env
                    self.stack[top].pc = 1;
                    let names: Vec<String> =
                        bindings.iter().map(|b| b.name.text.clone()).collect();
                    for name in names {
                        let loc = self.heap.len();
                        self.heap.push(Value::Void);
                        self.stack[owner].env.push((name, loc));
                    }
                } else if pc <= n {
                    self.stack[top].pc = pc + 1;
                    let child = bindings[pc - 1].value;
                    push_child(&mut self.stack, child, owner);
                } else if pc == n + 1 {
                    self.stack[top].pc = pc + 1;
                    let child = *body;
                    push_child(&mut self.stack, child, owner);
                } else {
                    // retract the bindings; the body's result is inherited.
                    // this layer is never elided by TCO because the env
                    // must be restored here.
                    let env = &mut self.stack[owner].env;
                    env.truncate(env.len() - n);
                    self.stack.pop();
                }
            }

            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                if pc == 0 {
                    self.stack[top].pc = 1;
                    let child = *cond;
                    push_child(&mut self.stack, child, owner);
                } else if pc == 1 {
                    self.stack[top].pc = 2;
                    let loc = self.result_loc(sl)?;
                    let Value::Int(v) = &self.heap[loc] else {
                        return Err(self.runtime_error("if condition is not an integer", sl));
                    };
                    let child = if *v != 0 { *then_branch } else { *else_branch };
                    push_child(&mut self.stack, child, owner);
                } else {
                    self.stack.pop();
                }
            }

            ExprKind::Seq(exprs) => {
                if pc < exprs.len() {
                    self.stack[top].pc = pc + 1;
                    let child = exprs[pc];
                    push_child(&mut self.stack, child, owner);
                } else {
                    // the sequence's value is its last expression's value
                    self.stack.pop();
                }
            }

            ExprKind::Intrinsic { name, args } => {
                let n = args.len();
                if pc > 0 && pc <= n {
                    let loc = self.result_loc(sl)?;
                    self.stack[top].local.push(loc);
                }
                if pc < n {
                    self.stack[top].pc = pc + 1;
                    let child = args[pc];
                    push_child(&mut self.stack, child, owner);
                } else {
                    // arguments are passed by reference (their locations)
                    let value =
                        self.call_intrinsic(sl, name, &self.stack[top].local, io)?;
                    let loc = self.heap.len();
                    self.heap.push(value);
                    self.result = Some(loc);
                    self.stack.pop();
                }
            }

            ExprKind::Call { callee, args } => {
                let n = args.len();
                if pc > 2 && pc <= n + 2 {
                    let loc = self.result_loc(sl)?;
                    self.stack[top].local.push(loc);
                }
                if pc == 0 {
                    self.stack[top].pc = 1;
                    let child = *callee;
                    push_child(&mut self.stack, child, owner);
                } else if pc == 1 {
                    self.stack[top].pc = 2;
                    let loc = self.result_loc(sl)?;
                    self.stack[top].local.push(loc);
                } else if pc <= n + 1 {
                    self.stack[top].pc = pc + 1;
                    let child = args[pc - 2];
                    push_child(&mut self.stack, child, owner);
                } else if pc == n + 2 {
                    self.stack[top].pc = pc + 1;
                    let callee_loc = self.stack[top].local[0];
                    let Value::Closure(closure) = &self.heap[callee_loc] else {
                        return Err(self.runtime_error("calling a non-callable", sl));
                    };
                    let closure = closure.clone();
                    let ExprKind::Lambda { params, body } =
                        &self.ast.node(closure.lambda).kind
                    else {
                        return Err(
                            self.runtime_error("internal: closure without a lambda", sl)
                        );
                    };
                    let arg_locs = &self.stack[top].local[1..];
                    if arg_locs.len() != params.len() {
                        return Err(self.runtime_error(
                            format!(
                                "wrong number of arguments: expected {} got {}",
                                params.len(),
                                arg_locs.len()
                            ),
                            sl,
                        ));
                    }
                    // lexical scope: the callee runs in a copy of its
                    // captured env, with arguments passed by reference
                    let mut new_env = closure.env;
                    for (param, &loc) in params.iter().zip(arg_locs) {
                        new_env.push((param.text.clone(), loc));
                    }
                    let body = *body;
                    // tail call: collapse everything down to and including
                    // the current frame before entering the callee
                    if self.ast.node(expr).tail {
                        while matches!(self.stack.last(), Some(l) if !l.frame) {
                            self.stack.pop();
                        }
                        self.stack.pop();
                    }
                    let idx = self.stack.len();
                    self.stack.push(Layer {
                        expr: Some(body),
                        frame: true,
                        owner: idx,
                        env: new_env,
                        pc: 0,
                        local: Vec::new(),
                    });
                } else {
                    self.stack.pop();
                }
            }

            ExprKind::At { field, target } => {
                if pc == 0 {
                    self.stack[top].pc = 1;
                    let child = *target;
                    push_child(&mut self.stack, child, owner);
                } else {
                    let loc = self.result_loc(sl)?;
                    let Value::Closure(closure) = &self.heap[loc] else {
                        return Err(self.runtime_error("@ applied to a non-closure", sl));
                    };
                    let Some(proj) = lookup(&closure.env, &field.text) else {
                        return Err(self.runtime_error(
                            format!("undefined variable {}", field.text),
                            sl,
                        ));
                    };
                    // access by reference: publish the binding's location,
                    // not a copy of the value
                    self.result = Some(proj);
                    self.stack.pop();
                }
            }
        }
        Ok(true)
    }

    /// Mark, sweep-and-compact, relocate. Returns the live heap size.
    pub fn collect_garbage(&mut self) -> usize {
        let marked = self.mark();
        let relocation = self.sweep_and_compact(&marked);
        self.relocate(&relocation);
        self.heap.len()
    }

    fn mark(&self) -> Vec<bool> {
        let mut marked = vec![false; self.heap.len()];
        let mut work: Vec<Location> = Vec::new();
        for layer in &self.stack {
            // only frames own an environment; their descendants would
            // double-count it
            if layer.frame {
                work.extend(layer.env.iter().map(|&(_, loc)| loc));
            }
            work.extend(layer.local.iter().copied());
        }
        if let Some(loc) = self.result {
            work.push(loc);
        }
        while let Some(loc) = work.pop() {
            if !marked[loc] {
                marked[loc] = true;
                if let Value::Closure(c) = &self.heap[loc] {
                    work.extend(c.env.iter().map(|&(_, l)| l));
                }
            }
        }
        marked
    }

    /// Stable compaction above the immortal literals; returns the old-to-new
    /// map for every slot that moved.
    fn sweep_and_compact(&mut self, marked: &[bool]) -> HashMap<Location, Location> {
        let mut relocation = HashMap::new();
        let mut i = self.num_literals;
        for j in self.num_literals..self.heap.len() {
            if marked[j] {
                if i < j {
                    self.heap.swap(i, j);
                    relocation.insert(j, i);
                }
                i += 1;
            }
        }
        self.heap.truncate(i);
        relocation
    }

    fn relocate(&mut self, relocation: &HashMap<Location, Location>) {
        let reloc = |loc: &mut Location| {
            if let Some(&new) = relocation.get(loc) {
                *loc = new;
            }
        };
        for layer in &mut self.stack {
            if layer.frame {
                for (_, loc) in &mut layer.env {
                    reloc(loc);
                }
            }
            for loc in &mut layer.local {
                reloc(loc);
            }
        }
        if let Some(loc) = &mut self.result {
            reloc(loc);
        }
        // closures live in the heap; forgetting their envs here would be
        // silent corruption after the first collection
        for value in &mut self.heap {
            if let Value::Closure(c) = value {
                for (_, loc) in &mut c.env {
                    reloc(loc);
                }
            }
        }
    }
}
