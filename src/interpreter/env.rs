use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::value::{Instance, Value};

/// A runtime environment frame. Frames chain up to the globals; method
/// frames additionally carry the receiving instance, whose fields act as
/// an implicit scope between the frame and its parent.
#[derive(Debug, Default)]
pub struct Env {
    vars: HashMap<String, Value>,
    parent: Option<Rc<RefCell<Env>>>,
    receiver: Option<Rc<Instance>>,
}

impl Env {
    pub fn root() -> Rc<RefCell<Env>> {
        Rc::new(RefCell::new(Env::default()))
    }

    pub fn child(parent: &Rc<RefCell<Env>>) -> Rc<RefCell<Env>> {
        Env::call(parent, None)
    }

    pub fn call(parent: &Rc<RefCell<Env>>, receiver: Option<Rc<Instance>>) -> Rc<RefCell<Env>> {
        Rc::new(RefCell::new(Env {
            vars: HashMap::new(),
            parent: Some(parent.clone()),
            receiver,
        }))
    }

    pub fn define(&mut self, name: String, value: Value) {
        self.vars.insert(name, value);
    }
}

pub fn lookup(env: &Rc<RefCell<Env>>, name: &str) -> Option<Value> {
    let frame = env.borrow();
    if let Some(value) = frame.vars.get(name) {
        return Some(value.clone());
    }
    if let Some(receiver) = &frame.receiver {
        if let Some(value) = receiver.get(name) {
            return Some(value);
        }
    }
    frame.parent.as_ref().and_then(|parent| lookup(parent, name))
}

/// Writes to the nearest binding of `name`, including receiver fields.
/// Returns false when no binding exists anywhere up the chain.
pub fn assign(env: &Rc<RefCell<Env>>, name: &str, value: Value) -> bool {
    {
        let mut frame = env.borrow_mut();
        if let Some(slot) = frame.vars.get_mut(name) {
            *slot = value;
            return true;
        }
    }
    {
        let frame = env.borrow();
        if let Some(receiver) = &frame.receiver {
            if receiver.set(name, value.clone()) {
                return true;
            }
        }
    }
    let parent = env.borrow().parent.clone();
    match parent {
        Some(parent) => assign(&parent, name, value),
        None => false,
    }
}

/// The instance the nearest enclosing method frame is bound to.
pub fn receiver_of(env: &Rc<RefCell<Env>>) -> Option<Rc<Instance>> {
    let frame = env.borrow();
    if let Some(receiver) = &frame.receiver {
        return Some(receiver.clone());
    }
    frame.parent.as_ref().and_then(receiver_of)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_walks_outwards() {
        let root = Env::root();
        root.borrow_mut().define(String::from("x"), Value::Int(1));

        let inner = Env::child(&root);
        assert_eq!(lookup(&inner, "x"), Some(Value::Int(1)));

        inner.borrow_mut().define(String::from("x"), Value::Int(2));
        assert_eq!(lookup(&inner, "x"), Some(Value::Int(2)));
        assert_eq!(lookup(&root, "x"), Some(Value::Int(1)));
    }

    #[test]
    fn test_assign_targets_defining_frame() {
        let root = Env::root();
        root.borrow_mut().define(String::from("x"), Value::Int(1));

        let inner = Env::child(&root);
        assert!(assign(&inner, "x", Value::Int(5)));
        assert_eq!(lookup(&root, "x"), Some(Value::Int(5)));
        assert!(!assign(&inner, "missing", Value::Null));
    }

    #[test]
    fn test_receiver_fields_are_visible() {
        let instance = Rc::new(Instance {
            name: String::from("P"),
            class: true,
            fields: RefCell::new(vec![(String::from("n"), Value::Int(7))]),
        });

        let root = Env::root();
        let frame = Env::call(&root, Some(instance));
        assert_eq!(lookup(&frame, "n"), Some(Value::Int(7)));

        assert!(assign(&frame, "n", Value::Int(9)));
        assert_eq!(lookup(&frame, "n"), Some(Value::Int(9)));
    }
}
