use std::{fmt::Display, rc::Rc};

use itertools::Itertools;

use crate::util::{Name, RecField};

pub mod builtin;
pub mod quote;
pub mod semantics;

// Variables are represented by their name together with an index that counts
// the binders *of that same name* between the occurrence and the binder it
// refers to, so `x@0` is the nearest enclosing `x` no matter how many binders
// of other names are in between.
pub type Index = usize;

// The number of binders of a name that had been passed when a quoting
// placeholder for that name was created. Like De Bruijn levels these do not
// change meaning as more binders are passed.
pub type Level = usize;

/// Universes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Const {
    Type,
    Kind,
    Sort,
}

/// The fixed table of built-in types and functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Bool,
    Natural,
    Integer,
    Double,
    Text,
    List,
    Optional,
    None,

    NaturalFold,
    NaturalIsZero,
    NaturalEven,
    NaturalOdd,
    NaturalShow,
    NaturalSubtract,
    NaturalToInteger,
    IntegerShow,
    IntegerToDouble,
    DoubleShow,
}

impl Builtin {
    pub const ALL: [Builtin; 18] = [
        Builtin::Bool,
        Builtin::Natural,
        Builtin::Integer,
        Builtin::Double,
        Builtin::Text,
        Builtin::List,
        Builtin::Optional,
        Builtin::None,
        Builtin::NaturalFold,
        Builtin::NaturalIsZero,
        Builtin::NaturalEven,
        Builtin::NaturalOdd,
        Builtin::NaturalShow,
        Builtin::NaturalSubtract,
        Builtin::NaturalToInteger,
        Builtin::IntegerShow,
        Builtin::IntegerToDouble,
        Builtin::DoubleShow,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Builtin::Bool => "Bool",
            Builtin::Natural => "Natural",
            Builtin::Integer => "Integer",
            Builtin::Double => "Double",
            Builtin::Text => "Text",
            Builtin::List => "List",
            Builtin::Optional => "Optional",
            Builtin::None => "None",
            Builtin::NaturalFold => "Natural/fold",
            Builtin::NaturalIsZero => "Natural/isZero",
            Builtin::NaturalEven => "Natural/even",
            Builtin::NaturalOdd => "Natural/odd",
            Builtin::NaturalShow => "Natural/show",
            Builtin::NaturalSubtract => "Natural/subtract",
            Builtin::NaturalToInteger => "Natural/toInteger",
            Builtin::IntegerShow => "Integer/show",
            Builtin::IntegerToDouble => "Integer/toDouble",
            Builtin::DoubleShow => "Double/show",
        }
    }

    pub fn from_name(name: &str) -> Option<Builtin> {
        Builtin::ALL.into_iter().find(|b| b.name() == name)
    }

    /// The number of arguments the built-in takes before it can reduce
    pub fn arity(&self) -> usize {
        match self {
            Builtin::Bool
            | Builtin::Natural
            | Builtin::Integer
            | Builtin::Double
            | Builtin::Text => 0,

            Builtin::List
            | Builtin::Optional
            | Builtin::None
            | Builtin::NaturalIsZero
            | Builtin::NaturalEven
            | Builtin::NaturalOdd
            | Builtin::NaturalShow
            | Builtin::NaturalToInteger
            | Builtin::IntegerShow
            | Builtin::IntegerToDouble
            | Builtin::DoubleShow => 1,

            Builtin::NaturalSubtract => 2,
            Builtin::NaturalFold => 4,
        }
    }
}

impl Display for Builtin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.name().fmt(f)
    }
}

/// Binary operators, loosest binding first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Equiv,
    Or,
    Plus,
    TextAppend,
    ListAppend,
    And,
    Combine,
    Prefer,
    CombineTypes,
    Times,
    Eq,
    Ne,
}

impl Op {
    fn prec(&self) -> usize {
        match self {
            Op::Equiv => 1,
            Op::Or => 2,
            Op::Plus => 3,
            Op::TextAppend => 4,
            Op::ListAppend => 5,
            Op::And => 6,
            Op::Combine => 7,
            Op::Prefer => 8,
            Op::CombineTypes => 9,
            Op::Times => 10,
            Op::Eq => 11,
            Op::Ne => 12,
        }
    }
}

impl Display for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Op::Equiv => "===",
            Op::Or => "||",
            Op::Plus => "+",
            Op::TextAppend => "++",
            Op::ListAppend => "#",
            Op::And => "&&",
            Op::Combine => "∧",
            Op::Prefer => "⫽",
            Op::CombineTypes => "⩓",
            Op::Times => "*",
            Op::Eq => "==",
            Op::Ne => "!=",
        }
        .fmt(f)
    }
}

/// A double literal. Doubles are compared by their bit pattern, so that
/// `NaN` is equal to itself and `0.0` and `-0.0` are distinct.
#[derive(Debug, Clone, Copy)]
pub struct Double(pub f64);

impl PartialEq for Double {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Display for Double {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let d = self.0;
        if d.is_nan() {
            "NaN".fmt(f)
        } else if d.is_infinite() && d > 0.0 {
            "Infinity".fmt(f)
        } else if d.is_infinite() {
            "-Infinity".fmt(f)
        } else {
            // the debug representation always carries a fraction or exponent,
            // but the mantissa of an exponent may lack its fraction
            let s = format!("{d:?}");
            match s.split_once('e') {
                Some((mantissa, exp)) if !mantissa.contains('.') => {
                    write!(f, "{mantissa}.0e{exp}")
                }
                _ => s.fmt(f),
            }
        }
    }
}

/// A piece of literal text followed by an interpolated expression
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk<T> {
    pub prefix: String,
    pub data: T,
}

impl<T> Chunk<T> {
    pub fn new(prefix: String, data: T) -> Chunk<T> {
        Chunk { prefix, data }
    }
}

/// The fields of a record or the alternatives of a union.
///
/// Field names are unique. The order fields were written in is kept for
/// display but is not significant for equality.
#[derive(Debug, Clone)]
pub struct Fields<T> {
    vec: Vec<RecField<T>>,
}

impl<T> Fields<T> {
    pub fn new(vec: Vec<RecField<T>>) -> Fields<T> {
        Fields { vec }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RecField<T>> {
        self.vec.iter()
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.vec
            .iter()
            .find(|field| field.name == name)
            .map(|field| &field.data)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.vec.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vec.is_empty()
    }
}

impl<T> Default for Fields<T> {
    fn default() -> Self {
        Fields { vec: vec![] }
    }
}

impl<T> FromIterator<RecField<T>> for Fields<T> {
    fn from_iter<I: IntoIterator<Item = RecField<T>>>(iter: I) -> Self {
        Fields {
            vec: iter.into_iter().collect(),
        }
    }
}

impl<T> IntoIterator for Fields<T> {
    type Item = RecField<T>;
    type IntoIter = std::vec::IntoIter<RecField<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.vec.into_iter()
    }
}

impl<T: PartialEq> PartialEq for Fields<T> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|field| other.get(&field.name) == Some(&field.data))
    }
}

/// Terms, as produced by the parser and by quotation
#[derive(Debug, Clone, PartialEq)]
pub enum Tm {
    /// Universes: `Type`, `Kind`, `Sort`
    Const { c: Const },
    /// Built-in types and functions
    Builtin { builtin: Builtin },

    /// Bound variables
    Var { name: Name, index: Index },
    /// Global names, with no binder
    Free { name: Name },
    /// Variables bound by a typing context rather than by the term itself.
    /// These are left alone by quotation.
    Local { name: Name, index: Index },

    Lam { name: Name, ty: Rc<Tm>, body: Rc<Tm> },
    Pi { name: Name, ty: Rc<Tm>, body: Rc<Tm> },
    App { head: Rc<Tm>, arg: Rc<Tm> },
    Let {
        name: Name,
        ty: Option<Rc<Tm>>,
        def: Rc<Tm>,
        body: Rc<Tm>,
    },
    /// Type ascription, `tm : ty`
    Annot { tm: Rc<Tm>, ty: Rc<Tm> },
    Op { op: Op, tm0: Rc<Tm>, tm1: Rc<Tm> },

    BoolLit { b: bool },
    NaturalLit { n: u64 },
    IntegerLit { i: i64 },
    DoubleLit { d: Double },
    TextLit { chunks: Vec<Chunk<Tm>>, suffix: String },

    /// An empty list, annotated with its full type, `[] : List T`
    EmptyList { ty: Rc<Tm> },
    NonEmptyList { tms: Vec<Tm> },

    If { cond: Rc<Tm>, tm0: Rc<Tm>, tm1: Rc<Tm> },
    Some { tm: Rc<Tm> },

    RecordType { fields: Fields<Tm> },
    RecordLit { fields: Fields<Tm> },
    UnionType { alts: Fields<Option<Tm>> },
    Field { tm: Rc<Tm>, name: Name },
    Project { tm: Rc<Tm>, names: Vec<Name> },
    Merge {
        handler: Rc<Tm>,
        union: Rc<Tm>,
        ann: Option<Rc<Tm>>,
    },
    ToMap { tm: Rc<Tm>, ann: Option<Rc<Tm>> },

    Assert { ann: Rc<Tm> },

    /// An import that was not resolved before normalization
    Import { import: String },
}

impl Tm {
    /// Whether the variable `name@index` occurs free in the term
    pub fn mentions(&self, name: &str, index: Index) -> bool {
        // the index of the variable once under a binder called `n`
        let under = |n: &str| if n == name { index + 1 } else { index };

        match self {
            Tm::Var { name: n, index: i } => n == name && *i == index,

            Tm::Const { .. }
            | Tm::Builtin { .. }
            | Tm::Free { .. }
            | Tm::Local { .. }
            | Tm::BoolLit { .. }
            | Tm::NaturalLit { .. }
            | Tm::IntegerLit { .. }
            | Tm::DoubleLit { .. }
            | Tm::Import { .. } => false,

            Tm::Lam { name: n, ty, body } | Tm::Pi { name: n, ty, body } => {
                ty.mentions(name, index) || body.mentions(name, under(n.as_str()))
            }
            Tm::Let {
                name: n,
                ty,
                def,
                body,
            } => {
                ty.iter().any(|ty| ty.mentions(name, index))
                    || def.mentions(name, index)
                    || body.mentions(name, under(n.as_str()))
            }

            Tm::App { head: tm0, arg: tm1 }
            | Tm::Annot { tm: tm0, ty: tm1 }
            | Tm::Op { tm0, tm1, .. } => tm0.mentions(name, index) || tm1.mentions(name, index),

            Tm::TextLit { chunks, .. } => chunks.iter().any(|chunk| chunk.data.mentions(name, index)),
            Tm::EmptyList { ty: tm }
            | Tm::Some { tm }
            | Tm::Field { tm, .. }
            | Tm::Project { tm, .. }
            | Tm::Assert { ann: tm } => tm.mentions(name, index),
            Tm::NonEmptyList { tms } => tms.iter().any(|tm| tm.mentions(name, index)),
            Tm::If { cond, tm0, tm1 } => {
                cond.mentions(name, index) || tm0.mentions(name, index) || tm1.mentions(name, index)
            }

            Tm::RecordType { fields } | Tm::RecordLit { fields } => {
                fields.iter().any(|field| field.data.mentions(name, index))
            }
            Tm::UnionType { alts } => alts
                .iter()
                .filter_map(|alt| alt.data.as_ref())
                .any(|tm| tm.mentions(name, index)),

            Tm::Merge {
                handler,
                union,
                ann,
            } => {
                handler.mentions(name, index)
                    || union.mentions(name, index)
                    || ann.iter().any(|ann| ann.mentions(name, index))
            }
            Tm::ToMap { tm, ann } => {
                tm.mentions(name, index) || ann.iter().any(|ann| ann.mentions(name, index))
            }
        }
    }

    fn prec(&self) -> usize {
        match self {
            Tm::Lam { .. }
            | Tm::Pi { .. }
            | Tm::Let { .. }
            | Tm::Annot { .. }
            | Tm::If { .. }
            | Tm::EmptyList { .. }
            | Tm::Assert { .. }
            | Tm::Merge { ann: Some(_), .. }
            | Tm::ToMap { ann: Some(_), .. } => TM,

            Tm::Op { op, .. } => op.prec(),

            Tm::App { .. } | Tm::Some { .. } | Tm::Merge { .. } | Tm::ToMap { .. } => APP,

            Tm::Field { .. } | Tm::Project { .. } => SEL,

            _ => PRIM,
        }
    }
}

// precedence levels for printing; operators sit between TM and APP
const TM: usize = 0;
const OP: usize = 1;
const APP: usize = 13;
const SEL: usize = 14;
const PRIM: usize = 15;

/// A term printed at some precedence, with parentheses if it binds looser
struct Prec<'a>(&'a Tm, usize);

impl Display for Prec<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Prec(tm, prec) = *self;
        if tm.prec() < prec {
            write!(f, "({tm})")
        } else {
            tm.fmt(f)
        }
    }
}

fn escape(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '"' => "\\\"".to_string(),
            '\\' => "\\\\".to_string(),
            '$' => "\\$".to_string(),
            '\n' => "\\n".to_string(),
            '\t' => "\\t".to_string(),
            '\r' => "\\r".to_string(),
            c => c.to_string(),
        })
        .collect()
}

impl Display for Tm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tm::Const { c } => format!("{c:?}").fmt(f),
            Tm::Builtin { builtin } => builtin.fmt(f),

            Tm::Var { name, index: 0 } | Tm::Free { name } => name.fmt(f),
            Tm::Var { name, index } => write!(f, "{name}@{index}"),
            Tm::Local { name, index } => write!(f, "[local {name}@{index}]"),

            Tm::Lam { name, ty, body } => write!(f, "λ({name} : {ty}) → {body}"),
            Tm::Pi { name, ty, body } if name == "_" && !body.mentions("_", 0) => {
                write!(f, "{} → {body}", Prec(ty, OP))
            }
            Tm::Pi { name, ty, body } => write!(f, "∀({name} : {ty}) → {body}"),
            Tm::App { head, arg } => write!(f, "{} {}", Prec(head, APP), Prec(arg, SEL)),
            Tm::Let {
                name,
                ty: Some(ty),
                def,
                body,
            } => write!(f, "let {name} : {ty} = {def} in {body}"),
            Tm::Let {
                name,
                ty: None,
                def,
                body,
            } => write!(f, "let {name} = {def} in {body}"),
            Tm::Annot { tm, ty } => write!(f, "{} : {ty}", Prec(tm, OP)),
            Tm::Op { op, tm0, tm1 } => write!(
                f,
                "{} {op} {}",
                Prec(tm0, op.prec()),
                Prec(tm1, op.prec() + 1)
            ),

            Tm::BoolLit { b: true } => "True".fmt(f),
            Tm::BoolLit { b: false } => "False".fmt(f),
            Tm::NaturalLit { n } => n.fmt(f),
            Tm::IntegerLit { i } if *i >= 0 => write!(f, "+{i}"),
            Tm::IntegerLit { i } => i.fmt(f),
            Tm::DoubleLit { d } => d.fmt(f),
            Tm::TextLit { chunks, suffix } => write!(
                f,
                "\"{}{}\"",
                chunks
                    .iter()
                    .map(|chunk| format!("{}${{{}}}", escape(&chunk.prefix), chunk.data))
                    .join(""),
                escape(suffix)
            ),

            Tm::EmptyList { ty } => write!(f, "[] : {ty}"),
            Tm::NonEmptyList { tms } => write!(f, "[{}]", tms.iter().join(", ")),

            Tm::If { cond, tm0, tm1 } => write!(f, "if {cond} then {tm0} else {tm1}"),
            Tm::Some { tm } => write!(f, "Some {}", Prec(tm, SEL)),

            Tm::RecordType { fields } if fields.is_empty() => "{}".fmt(f),
            Tm::RecordType { fields } => write!(
                f,
                "{{ {} }}",
                fields
                    .iter()
                    .map(|field| format!("{} : {}", field.name, field.data))
                    .join(", ")
            ),
            Tm::RecordLit { fields } if fields.is_empty() => "{=}".fmt(f),
            Tm::RecordLit { fields } => write!(f, "{{ {} }}", fields.iter().join(", ")),
            Tm::UnionType { alts } if alts.is_empty() => "<>".fmt(f),
            Tm::UnionType { alts } => write!(
                f,
                "< {} >",
                alts.iter()
                    .map(|alt| match &alt.data {
                        Some(ty) => format!("{} : {ty}", alt.name),
                        None => alt.name.clone(),
                    })
                    .join(" | ")
            ),
            Tm::Field { tm, name } => write!(f, "{}.{name}", Prec(tm, SEL)),
            Tm::Project { tm, names } => {
                write!(f, "{}.{{ {} }}", Prec(tm, SEL), names.iter().join(", "))
            }
            Tm::Merge {
                handler,
                union,
                ann,
            } => {
                write!(f, "merge {} {}", Prec(handler, SEL), Prec(union, SEL))?;
                match ann {
                    Some(ann) => write!(f, " : {ann}"),
                    None => Ok(()),
                }
            }
            Tm::ToMap { tm, ann } => {
                write!(f, "toMap {}", Prec(tm, SEL))?;
                match ann {
                    Some(ann) => write!(f, " : {ann}"),
                    None => Ok(()),
                }
            }

            Tm::Assert { ann } => write!(f, "assert : {ann}"),
            Tm::Import { import } => import.fmt(f),
        }
    }
}

#[cfg(test)]
mod test {
    use std::rc::Rc;

    use super::{Builtin, Double, Fields, Tm};
    use crate::util::RecField;

    #[test]
    fn builtin_names_round_trip() {
        for builtin in Builtin::ALL {
            assert_eq!(Builtin::from_name(builtin.name()), Some(builtin))
        }
    }

    #[test]
    fn field_order_is_not_significant() {
        let fields1 = Fields::new(vec![
            RecField::new("a".to_string(), 1),
            RecField::new("b".to_string(), 2),
        ]);
        let fields2 = Fields::new(vec![
            RecField::new("b".to_string(), 2),
            RecField::new("a".to_string(), 1),
        ]);

        assert_eq!(fields1, fields2)
    }

    #[test]
    fn doubles_compare_by_bits() {
        assert_eq!(Double(f64::NAN), Double(f64::NAN));
        assert_ne!(Double(0.0), Double(-0.0))
    }

    #[test]
    fn display_double_exponent() {
        assert_eq!(Double(1e300).to_string(), "1.0e300");
        assert_eq!(Double(1.5e-7).to_string(), "1.5e-7");
        assert_eq!(Double(2.0).to_string(), "2.0")
    }

    #[test]
    fn mentions_under_shadowing() {
        // λ(x : Bool) → x@1 mentions the outer x
        let tm = Tm::Lam {
            name: "x".to_string(),
            ty: Rc::new(Tm::Builtin {
                builtin: Builtin::Bool,
            }),
            body: Rc::new(Tm::Var {
                name: "x".to_string(),
                index: 1,
            }),
        };

        assert!(tm.mentions("x", 0));
        assert!(!tm.mentions("x", 1))
    }

    #[test]
    fn display_arrow() {
        let tm = Tm::Pi {
            name: "_".to_string(),
            ty: Rc::new(Tm::Builtin {
                builtin: Builtin::Natural,
            }),
            body: Rc::new(Tm::Builtin {
                builtin: Builtin::Bool,
            }),
        };

        insta::assert_snapshot!(tm, @"Natural → Bool")
    }

    #[test]
    fn display_dependent_underscore() {
        let tm = Tm::Pi {
            name: "_".to_string(),
            ty: Rc::new(Tm::Const {
                c: super::Const::Type,
            }),
            body: Rc::new(Tm::Var {
                name: "_".to_string(),
                index: 0,
            }),
        };

        insta::assert_snapshot!(tm, @"∀(_ : Type) → _")
    }
}
