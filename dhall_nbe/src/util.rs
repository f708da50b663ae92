use std::{fmt::Display, rc::Rc};

pub type Name = String;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecField<T> {
    pub name: Name,
    pub data: T,
}

impl<T> RecField<T> {
    pub fn new(name: Name, data: T) -> RecField<T> {
        RecField { name, data }
    }
}

impl<T: Display> Display for RecField<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        format!("{} = {}", self.name, self.data).fmt(f)
    }
}

/// An environment of named bindings.
///
/// Bindings are looked up by name and by the number of bindings of that same
/// name between the lookup and the binding, innermost first, which is how
/// bound variables are represented in terms. Extending an environment shares
/// the existing bindings, so closures can hold on to an environment while
/// evaluation carries on extending it.
#[derive(Debug)]
pub struct Env<A> {
    head: Option<Rc<Binding<A>>>,
    len: usize,
}

#[derive(Debug)]
struct Binding<A> {
    name: Name,
    a: A,
    next: Option<Rc<Binding<A>>>,
}

impl<A> Env<A> {
    pub fn iter(&self) -> Iter<'_, A> {
        Iter {
            next: self.head.as_deref(),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, name: &str, index: usize) -> &A {
        match self.iter().filter(|(n, _)| *n == name).nth(index) {
            Some((_, a)) => a,
            None => panic!("no binding for {name}@{index} in env?!"),
        }
    }

    pub fn with(&self, name: &str, a: A) -> Env<A> {
        Env {
            head: Some(Rc::new(Binding {
                name: name.to_string(),
                a,
                next: self.head.clone(),
            })),
            len: self.len + 1,
        }
    }
}

impl<A> Clone for Env<A> {
    fn clone(&self) -> Self {
        Env {
            head: self.head.clone(),
            len: self.len,
        }
    }
}

impl<A> Default for Env<A> {
    fn default() -> Self {
        Env { head: None, len: 0 }
    }
}

pub struct Iter<'a, A> {
    next: Option<&'a Binding<A>>,
}

impl<'a, A> Iterator for Iter<'a, A> {
    type Item = (&'a str, &'a A);

    fn next(&mut self) -> Option<Self::Item> {
        let binding = self.next?;
        self.next = binding.next.as_deref();

        Some((binding.name.as_str(), &binding.a))
    }
}

#[cfg(test)]
mod test {
    use super::Env;

    #[test]
    fn get_innermost() {
        let env = Env::default().with("x", 1).with("x", 2);

        assert_eq!(*env.get("x", 0), 2)
    }

    #[test]
    fn get_outer_same_name() {
        let env = Env::default().with("x", 1).with("y", 5).with("x", 2);

        assert_eq!(*env.get("x", 1), 1)
    }

    #[test]
    fn other_names_unaffected() {
        let env = Env::default().with("y", 5).with("x", 1).with("x", 2);

        assert_eq!(*env.get("y", 0), 5)
    }

    #[test]
    fn with_does_not_touch_original() {
        let env = Env::default().with("x", 1);
        let env1 = env.with("x", 2);

        assert_eq!((env.len(), env1.len()), (1, 2));
        assert_eq!(*env.get("x", 0), 1)
    }

    #[test]
    fn iter_innermost_first() {
        let env = Env::default().with("a", 1).with("b", 2);

        assert_eq!(env.iter().collect::<Vec<_>>(), vec![("b", &2), ("a", &1)])
    }

    #[test]
    #[should_panic]
    fn get_missing() {
        let env = Env::default().with("x", 1);

        env.get("x", 1);
    }
}
