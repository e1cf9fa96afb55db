//! Reactive properties with automatic dependency capture.
//!
//! A [`Property<T>`] is a value cell that can be *bound* to a closure
//! computing its value from other properties. Dependencies are captured
//! automatically: while a binding runs for the first time, every property
//! it reads registers itself as an input of the one being evaluated. The
//! resulting dependency graph is used to propagate changes.
//!
//! # Glitch-free propagation
//!
//! Assigning or rebinding a property re-evaluates its transitive
//! dependents in reverse-postorder topological order, so each dependent
//! runs exactly once per change and never observes a half-updated graph.
//! Cycles are detected during the sort with a three-color visit state;
//! the offending binding is discarded with a warning and previous values
//! are retained. A binding that reads the property it is bound to is
//! rejected the same way.
//!
//! # Thread confinement
//!
//! A property graph is confined to the thread that created it: handles are
//! not `Send`, and the "currently evaluating" marker used for capture is
//! thread-local. Independent graphs on different threads are safe.
//!
//! # Example
//!
//! ```
//! use strand_core::Property;
//!
//! let width = Property::new(2.0_f64);
//! let height = Property::new(4.0_f64);
//!
//! let area = Property::bound({
//!     let (width, height) = (width.watch(), height.watch());
//!     move || width.get() * height.get()
//! });
//! assert_eq!(area.get(), 8.0);
//!
//! width.assign(3.0);
//! assert_eq!(area.get(), 12.0);
//! ```

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

type BindingFn<T> = Box<dyn Fn() -> T>;
type NotifierFn<T> = Box<dyn Fn(&T)>;
type CellRef = Weak<dyn PropertyCell>;

/// Three-color visit state for the topological sort.
#[derive(Clone, Copy, PartialEq, Eq)]
enum VisitState {
    Unvisited,
    Visiting,
    Finished,
}

/// The thread-local "currently evaluating" holder.
///
/// While a binding runs for the first time, the property being evaluated
/// is installed here so that every `get` inside the binding can register
/// the dependency edge. Reset on success and on capture failure alike.
mod current {
    use super::PropertyCell;
    use std::cell::RefCell;
    use std::rc::Rc;

    thread_local! {
        static CURRENT_PROPERTY: RefCell<Option<Rc<dyn PropertyCell>>> =
            const { RefCell::new(None) };
    }

    pub(super) fn get() -> Option<Rc<dyn PropertyCell>> {
        CURRENT_PROPERTY.with(|current| current.borrow().clone())
    }

    pub(super) fn set(value: Option<Rc<dyn PropertyCell>>) {
        CURRENT_PROPERTY.with(|current| *current.borrow_mut() = value);
    }
}

fn cell_ptr(cell: &Rc<dyn PropertyCell>) -> *const () {
    Rc::as_ptr(cell) as *const ()
}

fn contains_cell(list: &[CellRef], target: *const ()) -> bool {
    list.iter()
        .any(|weak| weak.upgrade().is_some_and(|cell| cell_ptr(&cell) == target))
}

fn remove_cell(list: &mut Vec<CellRef>, target: *const ()) {
    list.retain(|weak| {
        weak.upgrade()
            .is_some_and(|cell| cell_ptr(&cell) != target)
    });
}

/// Type-erased view of a property node used by the dependency graph.
trait PropertyCell {
    fn evaluate_cell(&self);
    fn reset_binding(&self);
    fn inputs(&self) -> &RefCell<Vec<CellRef>>;
    fn outputs(&self) -> &RefCell<Vec<CellRef>>;
    fn visit(&self) -> &Cell<VisitState>;
    fn self_cell(&self) -> Rc<dyn PropertyCell>;
    fn register_input(&self, input: &Rc<dyn PropertyCell>);
    fn mark_self_loop(&self);
    fn display_name(&self) -> String;
}

struct PropertyNode<T> {
    // `None` only between construction of a bound property and its first
    // evaluation, which cannot read this node.
    value: RefCell<Option<T>>,
    binding: RefCell<Option<BindingFn<T>>>,
    binding_init: Cell<bool>,
    notifier: RefCell<Option<NotifierFn<T>>>,
    name: RefCell<Option<String>>,
    self_loop: Cell<bool>,
    inputs: RefCell<Vec<CellRef>>,
    outputs: RefCell<Vec<CellRef>>,
    visit: Cell<VisitState>,
    self_ref: CellRef,
}

impl<T: Clone + 'static> PropertyNode<T> {
    fn create(
        value: Option<T>,
        binding: Option<BindingFn<T>>,
        notifier: Option<NotifierFn<T>>,
    ) -> Rc<Self> {
        Rc::new_cyclic(|weak: &std::rc::Weak<PropertyNode<T>>| {
            let self_ref: CellRef = weak.clone();
            PropertyNode {
                value: RefCell::new(value),
                binding: RefCell::new(binding),
                binding_init: Cell::new(false),
                notifier: RefCell::new(notifier),
                name: RefCell::new(None),
                self_loop: Cell::new(false),
                inputs: RefCell::new(Vec::new()),
                outputs: RefCell::new(Vec::new()),
                visit: Cell::new(VisitState::Unvisited),
                self_ref,
            }
        })
    }

    fn get_value(&self) -> T {
        if let Some(evaluating) = current::get() {
            if cell_ptr(&evaluating) == self as *const Self as *const () {
                self.self_loop.set(true);
            } else {
                evaluating.register_input(&self.self_cell());
            }
        }

        self.value
            .borrow()
            .clone()
            .expect("property value is initialized before it can be read")
    }

    /// Run the binding (capturing inputs on the first run) and invoke the
    /// notifier. Returns `false` when capture found a self-dependency and
    /// the binding was discarded; the stored value is left untouched in
    /// that case.
    fn evaluate(&self) -> bool {
        let binding = self.binding.borrow_mut().take();
        if let Some(binding) = binding {
            if self.binding_init.get() {
                let value = binding();
                *self.value.borrow_mut() = Some(value);
                self.restore_binding(binding);
            } else {
                current::set(Some(self.self_cell()));
                let value = binding();
                current::set(None);

                if self.self_loop.replace(false) {
                    tracing::warn!(
                        target: "strand_core::property",
                        name = %self.display_name(),
                        "property uses itself as a dependency; binding discarded"
                    );
                    self.clear_input_edges();
                    return false;
                }

                *self.value.borrow_mut() = Some(value);
                self.binding_init.set(true);
                self.restore_binding(binding);
            }
        }

        self.notify();
        true
    }

    fn restore_binding(&self, binding: BindingFn<T>) {
        let mut slot = self.binding.borrow_mut();
        if slot.is_none() {
            *slot = Some(binding);
        }
    }

    fn notify(&self) {
        let notifier = self.notifier.borrow_mut().take();
        if let Some(notifier) = notifier {
            if let Some(value) = self.value.borrow().clone() {
                notifier(&value);
            }
            let mut slot = self.notifier.borrow_mut();
            if slot.is_none() {
                *slot = Some(notifier);
            }
        }
    }

    /// Remove this node from every input's output list and forget the
    /// inputs. Does not touch the binding.
    fn clear_input_edges(&self) {
        let me = self as *const Self as *const ();
        for input in self.inputs.borrow().iter() {
            if let Some(input) = input.upgrade() {
                remove_cell(&mut input.outputs().borrow_mut(), me);
            }
        }
        self.inputs.borrow_mut().clear();
    }

    /// Detach from inputs and drop the binding; assignment and rebinding
    /// both start from this state.
    fn clear_inputs(&self) {
        self.clear_input_edges();
        self.reset_binding();
    }

    /// Remove this node from every dependent's input list and reset their
    /// bindings; a dependent must not keep computing from a vanished
    /// input.
    fn clear_outputs(&self) {
        let me = self as *const Self as *const ();
        for output in self.outputs.borrow().iter() {
            if let Some(output) = output.upgrade() {
                remove_cell(&mut output.inputs().borrow_mut(), me);
                output.reset_binding();
            }
        }
        self.outputs.borrow_mut().clear();
    }
}

impl<T: Clone + 'static> PropertyCell for PropertyNode<T> {
    fn evaluate_cell(&self) {
        let _ = self.evaluate();
    }

    fn reset_binding(&self) {
        *self.binding.borrow_mut() = None;
        self.binding_init.set(false);
    }

    fn inputs(&self) -> &RefCell<Vec<CellRef>> {
        &self.inputs
    }

    fn outputs(&self) -> &RefCell<Vec<CellRef>> {
        &self.outputs
    }

    fn visit(&self) -> &Cell<VisitState> {
        &self.visit
    }

    fn self_cell(&self) -> Rc<dyn PropertyCell> {
        self.self_ref
            .upgrade()
            .expect("property node is alive while reachable")
    }

    fn register_input(&self, input: &Rc<dyn PropertyCell>) {
        let me = self.self_cell();

        {
            let mut outputs = input.outputs().borrow_mut();
            if !contains_cell(&outputs, cell_ptr(&me)) {
                outputs.push(Rc::downgrade(&me));
            }
        }

        {
            let mut inputs = self.inputs.borrow_mut();
            if !contains_cell(&inputs, cell_ptr(input)) {
                inputs.push(Rc::downgrade(input));
            }
        }
    }

    fn mark_self_loop(&self) {
        self.self_loop.set(true);
    }

    fn display_name(&self) -> String {
        self.name
            .borrow()
            .clone()
            .unwrap_or_else(|| String::from("<unnamed>"))
    }
}

/// Depth-first reverse-postorder visit over the outputs graph.
fn topo_visit(
    cell: &Rc<dyn PropertyCell>,
    sorted: &mut Vec<Rc<dyn PropertyCell>>,
    touched: &mut Vec<Rc<dyn PropertyCell>>,
    cycle: &mut bool,
) {
    cell.visit().set(VisitState::Visiting);
    touched.push(cell.clone());

    let outputs: Vec<Rc<dyn PropertyCell>> = cell
        .outputs()
        .borrow()
        .iter()
        .filter_map(Weak::upgrade)
        .collect();

    for output in outputs {
        match output.visit().get() {
            VisitState::Unvisited => topo_visit(&output, sorted, touched, cycle),
            VisitState::Visiting => {
                tracing::warn!(
                    target: "strand_core::property",
                    name = %output.display_name(),
                    "property binding cycle detected"
                );
                *cycle = true;
            }
            VisitState::Finished => {}
        }
        if *cycle {
            return;
        }
    }

    cell.visit().set(VisitState::Finished);
    sorted.push(cell.clone());
}

/// Re-evaluate everything downstream of `cell` exactly once, in dependency
/// order. Returns `false` if a cycle aborted the traversal; no dependent
/// is evaluated in that case. Visit states are reset either way.
fn propagate_from(cell: &Rc<dyn PropertyCell>) -> bool {
    let mut sorted = Vec::new();
    let mut touched = Vec::new();
    let mut cycle = false;

    topo_visit(cell, &mut sorted, &mut touched, &mut cycle);

    if !cycle {
        // The root ends up last in postorder and is already up to date;
        // walk the rest from the root forward to the leaves.
        for dependent in sorted.iter().rev().skip(1) {
            dependent.evaluate_cell();
        }
    }

    for visited in &touched {
        visited.visit().set(VisitState::Unvisited);
    }

    !cycle
}

/// A reactive value cell.
///
/// See the [module docs](self) for the propagation and capture rules.
/// `Property` handles are not `Send`; a graph belongs to the thread that
/// built it.
pub struct Property<T: Clone + 'static> {
    node: Rc<PropertyNode<T>>,
}

impl<T: Clone + 'static> Property<T> {
    /// Create a property holding a plain value.
    pub fn new(value: T) -> Self {
        Self {
            node: PropertyNode::create(Some(value), None, None),
        }
    }

    /// Create a property holding a plain value, with a notifier invoked on
    /// every subsequent evaluation or assignment.
    pub fn with_notifier<N>(value: T, notifier: N) -> Self
    where
        N: Fn(&T) + 'static,
    {
        Self {
            node: PropertyNode::create(Some(value), None, Some(Box::new(notifier))),
        }
    }

    /// Create a property computed by `binding`.
    ///
    /// The binding runs immediately; properties it reads become inputs.
    pub fn bound<B>(binding: B) -> Self
    where
        B: Fn() -> T + 'static,
    {
        Self::bound_internal(Box::new(binding), None)
    }

    /// Create a computed property with a notifier. The notifier observes
    /// the initial evaluation too.
    pub fn bound_with_notifier<B, N>(binding: B, notifier: N) -> Self
    where
        B: Fn() -> T + 'static,
        N: Fn(&T) + 'static,
    {
        Self::bound_internal(Box::new(binding), Some(Box::new(notifier)))
    }

    fn bound_internal(binding: BindingFn<T>, notifier: Option<NotifierFn<T>>) -> Self {
        let node = PropertyNode::create(None, Some(binding), notifier);
        let _ = node.evaluate();
        Self { node }
    }

    /// Read the current value.
    ///
    /// Inside a binding's first evaluation this also records the read
    /// property as a dependency of the one being evaluated.
    pub fn get(&self) -> T {
        self.node.get_value()
    }

    /// A cloneable read handle for capturing this property inside binding
    /// closures.
    pub fn watch(&self) -> PropertyRef<T> {
        PropertyRef {
            node: self.node.clone(),
        }
    }

    /// Assign a plain value.
    ///
    /// Breaks any binding, detaches from inputs, stores the value, invokes
    /// the notifier, and re-evaluates all dependents exactly once each.
    pub fn assign(&self, value: T) {
        self.node.clear_inputs();
        *self.node.value.borrow_mut() = Some(value);
        self.node.notify();

        let cell: Rc<dyn PropertyCell> = self.node.clone();
        let _ = propagate_from(&cell);
    }

    /// Replace the binding.
    ///
    /// Previously captured inputs are discarded and recaptured during the
    /// new binding's first evaluation. If capture fails (the binding reads
    /// this property, or closes a cycle through the graph) the binding is
    /// discarded with a warning and the previous value is retained.
    pub fn bind<B>(&self, binding: B)
    where
        B: Fn() -> T + 'static,
    {
        self.node.clear_inputs();
        *self.node.binding.borrow_mut() = Some(Box::new(binding));
        self.node.binding_init.set(false);

        let previous = self.node.value.borrow().clone();
        if !self.node.evaluate() {
            return;
        }

        let cell: Rc<dyn PropertyCell> = self.node.clone();
        if !propagate_from(&cell) {
            self.node.clear_inputs();
            *self.node.value.borrow_mut() = previous;
        }
    }

    /// Install a notifier invoked with the value after every assignment or
    /// evaluation.
    pub fn set_notifier<N>(&self, notifier: N)
    where
        N: Fn(&T) + 'static,
    {
        *self.node.notifier.borrow_mut() = Some(Box::new(notifier));
    }

    /// Whether a binding is currently installed.
    pub fn binding_valid(&self) -> bool {
        self.node.binding.borrow().is_some()
    }

    /// Number of properties this one reads through its binding.
    pub fn input_count(&self) -> usize {
        self.node.inputs.borrow().len()
    }

    /// Number of properties whose bindings read this one.
    pub fn output_count(&self) -> usize {
        self.node.outputs.borrow().len()
    }

    /// Whether `other` is an input of this property.
    pub fn depends_on<U: Clone + 'static>(&self, other: &Property<U>) -> bool {
        let target = Rc::as_ptr(&other.node) as *const ();
        contains_cell(&self.node.inputs.borrow(), target)
    }

    /// Whether `other` is a dependent of this property.
    pub fn feeds<U: Clone + 'static>(&self, other: &Property<U>) -> bool {
        let target = Rc::as_ptr(&other.node) as *const ();
        contains_cell(&self.node.outputs.borrow(), target)
    }

    /// The property's diagnostic name, if one was set.
    pub fn name(&self) -> Option<String> {
        self.node.name.borrow().clone()
    }

    /// Set a diagnostic name, used in cycle warnings.
    pub fn set_name(&self, name: impl Into<String>) {
        *self.node.name.borrow_mut() = Some(name.into());
    }
}

impl<T: Clone + 'static> Drop for Property<T> {
    fn drop(&mut self) {
        self.node.clear_inputs();
        self.node.clear_outputs();
    }
}

impl<T: Clone + std::fmt::Debug + 'static> std::fmt::Debug for Property<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Property")
            .field("value", &*self.node.value.borrow())
            .field("binding_valid", &self.binding_valid())
            .finish()
    }
}

/// A cloneable read handle to a property, for capture inside binding
/// closures.
///
/// Reading through the handle participates in dependency capture exactly
/// like [`Property::get`]. The handle does not keep the property attached
/// to the graph: dropping the owning `Property` still detaches it.
pub struct PropertyRef<T: Clone + 'static> {
    node: Rc<PropertyNode<T>>,
}

impl<T: Clone + 'static> PropertyRef<T> {
    /// Read the current value, registering a dependency when captured.
    pub fn get(&self) -> T {
        self.node.get_value()
    }
}

impl<T: Clone + 'static> Clone for PropertyRef<T> {
    fn clone(&self) -> Self {
        Self {
            node: self.node.clone(),
        }
    }
}

/// A property whose value cannot be assigned or rebound after
/// construction.
///
/// It participates in the reactive graph exactly like [`Property`]: a
/// read-only property built with a binding still re-evaluates when its
/// inputs change. Only the mutating surface is absent.
pub struct ReadOnlyProperty<T: Clone + 'static> {
    inner: Property<T>,
}

impl<T: Clone + 'static> ReadOnlyProperty<T> {
    /// Create a read-only property holding a plain value.
    pub fn new(value: T) -> Self {
        Self {
            inner: Property::new(value),
        }
    }

    /// Create a read-only property with a notifier.
    pub fn with_notifier<N>(value: T, notifier: N) -> Self
    where
        N: Fn(&T) + 'static,
    {
        Self {
            inner: Property::with_notifier(value, notifier),
        }
    }

    /// Create a computed read-only property.
    pub fn bound<B>(binding: B) -> Self
    where
        B: Fn() -> T + 'static,
    {
        Self {
            inner: Property::bound(binding),
        }
    }

    /// Create a computed read-only property with a notifier.
    pub fn bound_with_notifier<B, N>(binding: B, notifier: N) -> Self
    where
        B: Fn() -> T + 'static,
        N: Fn(&T) + 'static,
    {
        Self {
            inner: Property::bound_with_notifier(binding, notifier),
        }
    }

    /// Read the current value.
    pub fn get(&self) -> T {
        self.inner.get()
    }

    /// A cloneable read handle, as [`Property::watch`].
    pub fn watch(&self) -> PropertyRef<T> {
        self.inner.watch()
    }

    /// Whether a binding is installed.
    pub fn binding_valid(&self) -> bool {
        self.inner.binding_valid()
    }

    /// Number of inputs captured by the binding.
    pub fn input_count(&self) -> usize {
        self.inner.input_count()
    }

    /// Number of dependents reading this property.
    pub fn output_count(&self) -> usize {
        self.inner.output_count()
    }

    /// The property's diagnostic name, if one was set.
    pub fn name(&self) -> Option<String> {
        self.inner.name()
    }

    /// Set a diagnostic name.
    pub fn set_name(&self, name: impl Into<String>) {
        self.inner.set_name(name);
    }
}
