//! Attribute sets and their construction
//!
//! An [`Attrset`] is either strict (a ready map) or backed by an
//! [`AttrsetBuilder`] that turns a list of `(attribute path, value)`
//! declarations into a map the first time anything asks for it.
//!
//! Building is re-entrant. For `rec { ... }` the builder is itself the
//! innermost shadowing scope of the values it builds, so evaluating one
//! declaration may look up a name and re-enter the builder. The builder
//! therefore keeps a cursor into the declaration list and advances it before
//! evaluating anything for a declaration; a re-entrant call continues with
//! the next unclaimed declaration and returns whatever map exists so far.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::trace;

use crate::errors::{EvalError, EvalResult};

use super::merge::merge_thunk;
use super::scope::{EvalCtx, Scope};
use super::thunk::Thunk;
use super::value::Value;

/// Attribute name to value storage, in definition order
pub type AttrMap = IndexMap<String, Value>;

/// Segments of a dotted attribute path (`a.${b}.c`); each may be lazy
pub type AttrPath = Vec<Value>;

/// Declarations of an attrset body, in source order
pub type AttrEntries = Vec<(AttrPath, Value)>;

/// Produces the declarations of a lazily built attrset
pub type AttrsetBody = Box<dyn FnOnce(&EvalCtx) -> EvalResult<AttrEntries>>;

/// Force an attribute name and convert it to a key
pub(crate) fn attr_name(name: &Value) -> EvalResult<String> {
    Ok(name.to_strict()?.as_string()?.to_string())
}

/// Wrap `value` so it ends up below the remaining path segments `rest`.
/// A `null` segment drops the nested part, leaving an empty attrset.
fn nest_attr_path(ctx: &EvalCtx, rest: &[Value], value: Value) -> Value {
    if rest.is_empty() {
        return value;
    }
    let rest = rest.to_vec();
    Value::Lazy(Thunk::new(ctx, move |ctx| {
        let name = rest[0].to_strict()?;
        if name.is_null() {
            return Ok(Value::Attrset(Attrset::empty()));
        }
        let key = attr_name(&name)?;
        let nested = nest_attr_path(ctx, &rest[1..], value);
        Ok(Value::attrset(AttrMap::from([(key, nested)])))
    }))
}

struct BuilderState {
    /// Construction context; dropped once building is done
    ctx: Option<EvalCtx>,
    body: Option<AttrsetBody>,
    /// `None` while the body has not produced its declarations yet
    entries: Option<AttrEntries>,
    cursor: usize,
    map: AttrMap,
    done: bool,
    poisoned: Option<EvalError>,
}

/// Incrementally builds the map of a lazy attrset
pub struct AttrsetBuilder {
    state: RefCell<BuilderState>,
}

impl AttrsetBuilder {
    fn new(body: AttrsetBody) -> Self {
        Self {
            state: RefCell::new(BuilderState {
                ctx: None,
                body: Some(body),
                entries: None,
                cursor: 0,
                map: AttrMap::new(),
                done: false,
                poisoned: None,
            }),
        }
    }

    /// Process every declaration not yet claimed. Returns early, with a
    /// partial map, when called re-entrantly.
    fn build(&self) -> EvalResult<()> {
        let ctx = {
            let state = self.state.borrow();
            if let Some(err) = &state.poisoned {
                return Err(err.clone());
            }
            if state.done {
                return Ok(());
            }
            match &state.ctx {
                Some(ctx) => ctx.clone(),
                None => return Ok(()),
            }
        };

        if let Err(err) = self.process(&ctx) {
            self.state.borrow_mut().poisoned = Some(err.clone());
            return Err(err);
        }
        Ok(())
    }

    fn process(&self, ctx: &EvalCtx) -> EvalResult<()> {
        let body = self.state.borrow_mut().body.take();
        if let Some(body) = body {
            let entries = body(ctx)?;
            trace!(entries = entries.len(), "building attrset");
            self.state.borrow_mut().entries = Some(entries);
        }

        loop {
            let (path, value) = {
                let mut state = self.state.borrow_mut();
                if state.done {
                    return Ok(());
                }
                let index = state.cursor;
                let entry = match &state.entries {
                    Some(entries) if index < entries.len() => entries[index].clone(),
                    Some(_) => break,
                    // The body is still running further up the stack
                    None => return Ok(()),
                };
                state.cursor += 1;
                entry
            };
            self.define(ctx, &path, value)?;
        }

        let mut state = self.state.borrow_mut();
        state.done = true;
        state.entries = None;
        state.ctx = None;
        Ok(())
    }

    /// Insert one declaration into the map, merging on collision
    fn define(&self, ctx: &EvalCtx, path: &[Value], value: Value) -> EvalResult<()> {
        let first = path.first().ok_or_else(|| {
            EvalError::other(
                "Unexpected attr path of zero length.",
                "attrset-attrpath-zero-length",
            )
        })?;
        let name = first.to_strict()?;
        if name.is_null() {
            return Ok(());
        }
        let key = attr_name(&name)?;
        let value = nest_attr_path(ctx, &path[1..], value);

        let mut state = self.state.borrow_mut();
        let value = match state.map.get(&key) {
            Some(existing) => merge_thunk(ctx, existing.clone(), value, vec![key.clone()]),
            None => value,
        };
        state.map.insert(key, value);
        Ok(())
    }

    fn is_done(&self) -> bool {
        self.state.borrow().done
    }
}

impl Scope for AttrsetBuilder {
    fn lookup(&self, name: &str) -> EvalResult<Option<Value>> {
        self.build()?;
        Ok(self.state.borrow().map.get(name).cloned())
    }
}

enum AttrsetRepr {
    Strict(AttrMap),
    Lazy(Rc<AttrsetBuilder>),
}

/// A shared, immutable attribute set
#[derive(Clone)]
pub struct Attrset(Rc<AttrsetRepr>);

impl Attrset {
    /// An attrset over a ready map
    pub fn strict(map: AttrMap) -> Self {
        Attrset(Rc::new(AttrsetRepr::Strict(map)))
    }

    pub fn empty() -> Self {
        Self::strict(AttrMap::new())
    }

    /// `{ ... }`: declarations are evaluated in `ctx` on first access
    pub fn lazy(
        ctx: &EvalCtx,
        body: impl FnOnce(&EvalCtx) -> EvalResult<AttrEntries> + 'static,
    ) -> Self {
        let builder = Rc::new(AttrsetBuilder::new(Box::new(body)));
        builder.state.borrow_mut().ctx = Some(ctx.clone());
        Attrset(Rc::new(AttrsetRepr::Lazy(builder)))
    }

    /// `rec { ... }`: like [`Attrset::lazy`], but the declarations also see
    /// the attrset's own attributes as the innermost shadowing scope
    pub fn recursive(
        ctx: &EvalCtx,
        body: impl FnOnce(&EvalCtx) -> EvalResult<AttrEntries> + 'static,
    ) -> Self {
        let builder = Rc::new(AttrsetBuilder::new(Box::new(body)));
        let scope: Rc<dyn Scope> = builder.clone();
        builder.state.borrow_mut().ctx = Some(ctx.with_shadowing_scope(scope));
        Attrset(Rc::new(AttrsetRepr::Lazy(builder)))
    }

    /// Lazy attrset over a ready list of declarations
    pub fn from_entries(ctx: &EvalCtx, entries: AttrEntries) -> Self {
        Self::lazy(ctx, move |_| Ok(entries))
    }

    fn with_map<R>(&self, f: impl FnOnce(&AttrMap) -> R) -> EvalResult<R> {
        match &*self.0 {
            AttrsetRepr::Strict(map) => Ok(f(map)),
            AttrsetRepr::Lazy(builder) => {
                builder.build()?;
                let state = builder.state.borrow();
                Ok(f(&state.map))
            }
        }
    }

    /// Get an attribute by name
    pub fn get(&self, name: &str) -> EvalResult<Option<Value>> {
        self.with_map(|map| map.get(name).cloned())
    }

    /// Get an attribute by a name value (forced, must be a string)
    pub fn get_value(&self, name: &Value) -> EvalResult<Option<Value>> {
        self.get(&attr_name(name)?)
    }

    pub fn contains(&self, name: &str) -> EvalResult<bool> {
        self.with_map(|map| map.contains_key(name))
    }

    pub fn len(&self) -> EvalResult<usize> {
        self.with_map(|map| map.len())
    }

    pub fn is_empty(&self) -> EvalResult<bool> {
        self.with_map(|map| map.is_empty())
    }

    /// Attribute names in definition order
    pub fn keys(&self) -> EvalResult<Vec<String>> {
        self.with_map(|map| map.keys().cloned().collect())
    }

    /// Attribute names in lexicographic order
    pub fn sorted_keys(&self) -> EvalResult<Vec<String>> {
        let mut keys = self.keys()?;
        keys.sort();
        Ok(keys)
    }

    /// Entries ordered by attribute name
    pub fn sorted_entries(&self) -> EvalResult<Vec<(String, Value)>> {
        let mut entries = self.with_map(|map| {
            map.iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect::<Vec<_>>()
        })?;
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }

    /// Copy of the underlying map
    pub fn to_map(&self) -> EvalResult<AttrMap> {
        self.with_map(AttrMap::clone)
    }

    /// The map, if it is available without evaluating anything
    pub(crate) fn peek_map(&self) -> Option<AttrMap> {
        match &*self.0 {
            AttrsetRepr::Strict(map) => Some(map.clone()),
            AttrsetRepr::Lazy(builder) if builder.is_done() => {
                Some(builder.state.borrow().map.clone())
            }
            AttrsetRepr::Lazy(_) => None,
        }
    }
}

impl fmt::Debug for Attrset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.peek_map() {
            Some(map) => f.debug_tuple("Attrset").field(&map).finish(),
            None => f.write_str("Attrset(<lazy>)"),
        }
    }
}
