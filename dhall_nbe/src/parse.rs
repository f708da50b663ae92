use std::rc::Rc;

use crate::{
    core::{quote::QuoteCtx, Builtin, Chunk, Const, Double, Fields, Op, Tm},
    util::{Name, RecField},
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} at {start}..{end}")]
pub struct ParseError {
    pub start: usize,
    pub end: usize,
    pub message: String,
}

/// Parse a term. Variables with no binder of their name in scope become free.
pub fn parse(string: &str) -> Result<Tm, ParseError> {
    let tm = parser::complete(string).map_err(|e| ParseError {
        start: e.location.offset,
        end: e.location.offset + 1,
        message: format!("expected {}", e.expected),
    })?;

    Ok(close(&QuoteCtx::default(), &tm))
}

const KEYWORDS: [&str; 14] = [
    "if", "then", "else", "let", "in", "as", "using", "merge", "missing", "Some", "toMap",
    "assert", "forall", "with",
];

enum Selector {
    Field(Name),
    Project(Vec<Name>),
}

fn select(tm: Tm, selector: Selector) -> Tm {
    match selector {
        Selector::Field(name) => Tm::Field {
            tm: Rc::new(tm),
            name,
        },
        Selector::Project(names) => Tm::Project {
            tm: Rc::new(tm),
            names,
        },
    }
}

/// What follows an operator expression, if anything
enum Suffix {
    Arrow(Tm),
    Annot(Tm),
}

fn suffixed(tm: Tm, suffix: Option<Suffix>) -> Tm {
    match (tm, suffix) {
        (tm, None) => tm,
        (ty, Some(Suffix::Arrow(body))) => Tm::Pi {
            name: "_".to_string(),
            ty: Rc::new(ty),
            body: Rc::new(body),
        },
        // the annotation of `merge` and `toMap` belongs to them
        (
            Tm::Merge {
                handler,
                union,
                ann: None,
            },
            Some(Suffix::Annot(ty)),
        ) => Tm::Merge {
            handler,
            union,
            ann: Some(Rc::new(ty)),
        },
        (Tm::ToMap { tm, ann: None }, Some(Suffix::Annot(ty))) => Tm::ToMap {
            tm,
            ann: Some(Rc::new(ty)),
        },
        (tm, Some(Suffix::Annot(ty))) => Tm::Annot {
            tm: Rc::new(tm),
            ty: Rc::new(ty),
        },
    }
}

fn op(op: Op, tm0: Tm, tm1: Tm) -> Tm {
    Tm::Op {
        op,
        tm0: Rc::new(tm0),
        tm1: Rc::new(tm1),
    }
}

enum TextPart {
    Char(char),
    Interp(Tm),
}

fn text_lit(parts: Vec<TextPart>) -> Tm {
    let mut chunks = vec![];
    let mut s = String::new();
    for part in parts {
        match part {
            TextPart::Char(c) => s.push(c),
            TextPart::Interp(tm) => chunks.push(Chunk::new(std::mem::take(&mut s), tm)),
        }
    }

    Tm::TextLit { chunks, suffix: s }
}

/// Labels that name a constant or built-in rather than a variable
fn named(name: Name, index: Option<usize>) -> Tm {
    if index.is_none() {
        match name.as_str() {
            "Type" => return Tm::Const { c: Const::Type },
            "Kind" => return Tm::Const { c: Const::Kind },
            "Sort" => return Tm::Const { c: Const::Sort },
            "True" => return Tm::BoolLit { b: true },
            "False" => return Tm::BoolLit { b: false },
            "NaN" => return Tm::DoubleLit { d: Double(f64::NAN) },
            "Infinity" => {
                return Tm::DoubleLit {
                    d: Double(f64::INFINITY),
                }
            }
            _ => {}
        }
        if let Some(builtin) = Builtin::from_name(&name) {
            return Tm::Builtin { builtin };
        }
    }

    Tm::Var {
        name,
        index: index.unwrap_or(0),
    }
}

peg::parser! {
    grammar parser() for str {
        pub rule complete() -> Tm
            = _ tm:tm() _ ![_] { tm }

        rule tm() -> Tm
            = lam()
            / pi()
            / let_in()
            / if_then_else()
            / assert()
            / empty_list()
            / tm:op_tm() suffix:suffix()? { suffixed(tm, suffix) }

        rule lam() -> Tm
            = ("λ" / "\\") _ "(" _ name:label() _ ":" _ ty:tm() _ ")" _ arrow() _ body:tm()
                { Tm::Lam { name, ty: Rc::new(ty), body: Rc::new(body) } }

        rule pi() -> Tm
            = ("∀" / kw("forall")) _ "(" _ name:label() _ ":" _ ty:tm() _ ")" _ arrow() _ body:tm()
                { Tm::Pi { name, ty: Rc::new(ty), body: Rc::new(body) } }

        rule let_in() -> Tm
            = bindings:(binding() ++ _) _ kw("in") _ body:tm()
                {
                    bindings.into_iter().rev().fold(body, |body, (name, ty, def)| Tm::Let {
                        name,
                        ty: ty.map(Rc::new),
                        def: Rc::new(def),
                        body: Rc::new(body),
                    })
                }

        rule binding() -> (Name, Option<Tm>, Tm)
            = kw("let") _ name:label() _ ty:(":" _ ty:tm() _ { ty })? "=" _ def:tm()
                { (name, ty, def) }

        rule if_then_else() -> Tm
            = kw("if") _ cond:tm() _ kw("then") _ tm0:tm() _ kw("else") _ tm1:tm()
                { Tm::If { cond: Rc::new(cond), tm0: Rc::new(tm0), tm1: Rc::new(tm1) } }

        rule assert() -> Tm
            = kw("assert") _ ":" _ ann:tm() { Tm::Assert { ann: Rc::new(ann) } }

        rule empty_list() -> Tm
            = "[" _ "]" _ ":" _ ty:app_tm() { Tm::EmptyList { ty: Rc::new(ty) } }

        rule suffix() -> Suffix
            = _ arrow() _ body:tm() { Suffix::Arrow(body) }
            / _ ":" _ ty:tm() { Suffix::Annot(ty) }

        rule op_tm() -> Tm = precedence!{
            tm0:(@) _ "===" _ tm1:@ { op(Op::Equiv, tm0, tm1) }
            --
            tm0:(@) _ "||" _ tm1:@ { op(Op::Or, tm0, tm1) }
            --
            tm0:(@) _ "+" space() tm1:@ { op(Op::Plus, tm0, tm1) }
            --
            tm0:(@) _ "++" _ tm1:@ { op(Op::TextAppend, tm0, tm1) }
            --
            tm0:(@) _ "#" _ tm1:@ { op(Op::ListAppend, tm0, tm1) }
            --
            tm0:(@) _ "&&" _ tm1:@ { op(Op::And, tm0, tm1) }
            --
            tm0:(@) _ ("∧" / "/\\") _ tm1:@ { op(Op::Combine, tm0, tm1) }
            --
            tm0:(@) _ ("⫽" / "//" !"\\") _ tm1:@ { op(Op::Prefer, tm0, tm1) }
            --
            tm0:(@) _ ("⩓" / "//\\\\") _ tm1:@ { op(Op::CombineTypes, tm0, tm1) }
            --
            tm0:(@) _ "*" _ tm1:@ { op(Op::Times, tm0, tm1) }
            --
            tm0:(@) _ "==" !"=" _ tm1:@ { op(Op::Eq, tm0, tm1) }
            --
            tm0:(@) _ "!=" _ tm1:@ { op(Op::Ne, tm0, tm1) }
            --
            tm:app_tm() { tm }
        }

        rule app_tm() -> Tm
            = head:first_app() args:(space() arg:selector_tm() { arg })*
                {
                    args.into_iter().fold(head, |head, arg| Tm::App { head: Rc::new(head), arg: Rc::new(arg) })
                }

        rule first_app() -> Tm
            = kw("merge") _ handler:selector_tm() space() union:selector_tm()
                { Tm::Merge { handler: Rc::new(handler), union: Rc::new(union), ann: None } }
            / kw("toMap") _ tm:selector_tm() { Tm::ToMap { tm: Rc::new(tm), ann: None } }
            / kw("Some") _ tm:selector_tm() { Tm::Some { tm: Rc::new(tm) } }
            / selector_tm()

        rule selector_tm() -> Tm
            = tm:primitive() selectors:(_ "." _ selector:selector() { selector })*
                { selectors.into_iter().fold(tm, select) }

        rule selector() -> Selector
            = name:field_label() { Selector::Field(name) }
            / "{" _ names:list(<field_label()>, <",">) _ "}" { Selector::Project(names) }

        rule primitive() -> Tm
            = double_lit()
            / n:natural() { Tm::NaturalLit { n } }
            / integer_lit()
            / "-Infinity" { Tm::DoubleLit { d: Double(f64::NEG_INFINITY) } }
            / text_lit()
            / "[" _ tms:list(<tm()>, <",">) _ "]" { Tm::NonEmptyList { tms } }
            / "{" _ ","? _ "=" _ ","? _ "}" { Tm::RecordLit { fields: Fields::default() } }
            / "{" _ ","? _ "}" { Tm::RecordType { fields: Fields::default() } }
            / "{" _ ","? _ fields:list(<record_lit_field()>, <",">) _ "}" { Tm::RecordLit { fields: Fields::new(fields) } }
            / "{" _ ","? _ fields:list(<record_ty_field()>, <",">) _ "}" { Tm::RecordType { fields: Fields::new(fields) } }
            / "<" _ "|"? _ ">" { Tm::UnionType { alts: Fields::default() } }
            / "<" _ "|"? _ alts:list(<union_alt()>, <"|">) _ ">" { Tm::UnionType { alts: Fields::new(alts) } }
            / import()
            / name:label() index:(_ "@" _ n:natural() { n as usize })? { named(name, index) }
            / "(" _ tm:tm() _ ")" { tm }

        rule record_lit_field() -> RecField<Tm>
            = name:field_label() _ "=" !"=" _ tm:tm() { RecField::new(name, tm) }

        rule record_ty_field() -> RecField<Tm>
            = name:field_label() _ ":" _ ty:tm() { RecField::new(name, ty) }

        rule union_alt() -> RecField<Option<Tm>>
            = name:field_label() ty:(_ ":" _ ty:tm() { ty })? { RecField::new(name, ty) }

        // fields and alternatives may also be called `Some`
        rule field_label() -> Name
            = label()
            / kw("Some") { "Some".to_string() }

        //

        rule natural() -> u64
            = "0x" n:$(hex_digit()+) {? u64::from_str_radix(n, 16).or(Err("natural")) }
            / "0" n:$(['0'..='7']+) {? u64::from_str_radix(n, 8).or(Err("natural")) }
            / n:$(['0'..='9']+) {? n.parse().or(Err("natural")) }

        rule integer_lit() -> Tm
            = s:$(['+' | '-'] ['0'..='9']+) {? s.parse().map(|i| Tm::IntegerLit { i }).or(Err("integer")) }

        rule double_lit() -> Tm
            = s:$(['+' | '-']? ['0'..='9']+ ("." ['0'..='9']+ exponent()? / exponent()))
                {? s.parse().map(|d| Tm::DoubleLit { d: Double(d) }).or(Err("double")) }

        rule exponent() = ['e' | 'E'] ['+' | '-']? ['0'..='9']+

        rule hex_digit() = ['0'..='9' | 'a'..='f' | 'A'..='F']

        rule text_lit() -> Tm
            = "\"" parts:text_part()* "\"" { text_lit(parts) }

        rule text_part() -> TextPart
            = "${" _ tm:tm() _ "}" { TextPart::Interp(tm) }
            / "\\" c:escape() { TextPart::Char(c) }
            / !("\"" / "\\" / "${") c:[_] { TextPart::Char(c) }

        rule escape() -> char
            = "\"" { '"' }
            / "\\" { '\\' }
            / "/" { '/' }
            / "$" { '$' }
            / "n" { '\n' }
            / "t" { '\t' }
            / "r" { '\r' }
            / "b" { '\u{8}' }
            / "f" { '\u{c}' }
            / "u" hex:$(hex_digit() hex_digit() hex_digit() hex_digit())
                {? u32::from_str_radix(hex, 16).ok().and_then(char::from_u32).ok_or("unicode escape") }

        rule import() -> Tm
            = s:$(("../" / "./" / "~/" / "/" !['/' | '\\']) path_char()+) { Tm::Import { import: s.to_string() } }
            / s:$(("https://" / "http://") path_char()+) { Tm::Import { import: s.to_string() } }
            / s:$("env:" ['A'..='Z' | 'a'..='z' | '_'] ['A'..='Z' | 'a'..='z' | '0'..='9' | '_']*)
                { Tm::Import { import: s.to_string() } }

        rule path_char()
            = !['\0'..=' ' | '(' | ')' | '[' | ']' | '{' | '}' | '<' | '>' | ',' | '"' | '#'] [_]

        rule label() -> Name
            = quiet!{
                s:$(label_start() label_char()*) {?
                    if KEYWORDS.contains(&s) { Err("label") } else { Ok(s.to_string()) }
                }
                / "`" s:$((!"`" [_])+) "`" { s.to_string() }
            }
            / expected!("label")

        rule label_start() = ['A'..='Z' | 'a'..='z' | '_']
        rule label_char() = ['A'..='Z' | 'a'..='z' | '0'..='9' | '_' | '/' | '-']

        rule kw(k: &'static str)
            = s:$(label_start() label_char()*) {? if s == k { Ok(()) } else { Err(k) } }

        rule arrow() = "->" / "→"

        //

        rule list<T>(tr: rule<T>, sepr: rule<()>) -> Vec<T>
            = v:(t:tr() ++ (_ sepr() _) {t}) (_ sepr())?
                { v }

        rule whitespace() = [' ' | '\t' | '\n' | '\r']
        rule line_comment() = "--" (!"\n" [_])*
        rule block_comment() = "{-" (block_comment() / !"-}" [_])* "-}"

        rule _ = quiet!{ (whitespace() / line_comment() / block_comment())* }
        rule space() = quiet!{ (whitespace() / line_comment() / block_comment())+ }
    }
}

/// Turn variables with no binder of their name in scope into free variables
fn close(ctx: &QuoteCtx, tm: &Tm) -> Tm {
    let rc = |tm: &Rc<Tm>| Rc::new(close(ctx, tm));
    let fields = |fields: &Fields<Tm>| -> Fields<Tm> {
        fields
            .iter()
            .map(|field| RecField::new(field.name.clone(), close(ctx, &field.data)))
            .collect()
    };

    match tm {
        Tm::Var { name, index } if *index >= ctx.get(name) => Tm::Free { name: name.clone() },

        Tm::Lam { name, ty, body } => Tm::Lam {
            name: name.clone(),
            ty: rc(ty),
            body: Rc::new(close(&ctx.with(name), body)),
        },
        Tm::Pi { name, ty, body } => Tm::Pi {
            name: name.clone(),
            ty: rc(ty),
            body: Rc::new(close(&ctx.with(name), body)),
        },
        Tm::Let {
            name,
            ty,
            def,
            body,
        } => Tm::Let {
            name: name.clone(),
            ty: ty.as_ref().map(rc),
            def: rc(def),
            body: Rc::new(close(&ctx.with(name), body)),
        },

        Tm::App { head, arg } => Tm::App {
            head: rc(head),
            arg: rc(arg),
        },
        Tm::Annot { tm, ty } => Tm::Annot {
            tm: rc(tm),
            ty: rc(ty),
        },
        Tm::Op { op, tm0, tm1 } => Tm::Op {
            op: *op,
            tm0: rc(tm0),
            tm1: rc(tm1),
        },
        Tm::TextLit { chunks, suffix } => Tm::TextLit {
            chunks: chunks
                .iter()
                .map(|chunk| Chunk::new(chunk.prefix.clone(), close(ctx, &chunk.data)))
                .collect(),
            suffix: suffix.clone(),
        },
        Tm::EmptyList { ty } => Tm::EmptyList { ty: rc(ty) },
        Tm::NonEmptyList { tms } => Tm::NonEmptyList {
            tms: tms.iter().map(|tm| close(ctx, tm)).collect(),
        },
        Tm::If { cond, tm0, tm1 } => Tm::If {
            cond: rc(cond),
            tm0: rc(tm0),
            tm1: rc(tm1),
        },
        Tm::Some { tm } => Tm::Some { tm: rc(tm) },

        Tm::RecordType { fields: fs } => Tm::RecordType { fields: fields(fs) },
        Tm::RecordLit { fields: fs } => Tm::RecordLit { fields: fields(fs) },
        Tm::UnionType { alts } => Tm::UnionType {
            alts: alts
                .iter()
                .map(|alt| RecField::new(alt.name.clone(), alt.data.as_ref().map(|ty| close(ctx, ty))))
                .collect(),
        },
        Tm::Field { tm, name } => Tm::Field {
            tm: rc(tm),
            name: name.clone(),
        },
        Tm::Project { tm, names } => Tm::Project {
            tm: rc(tm),
            names: names.clone(),
        },
        Tm::Merge {
            handler,
            union,
            ann,
        } => Tm::Merge {
            handler: rc(handler),
            union: rc(union),
            ann: ann.as_ref().map(rc),
        },
        Tm::ToMap { tm, ann } => Tm::ToMap {
            tm: rc(tm),
            ann: ann.as_ref().map(rc),
        },
        Tm::Assert { ann } => Tm::Assert { ann: rc(ann) },

        Tm::Const { .. }
        | Tm::Builtin { .. }
        | Tm::Var { .. }
        | Tm::Free { .. }
        | Tm::Local { .. }
        | Tm::BoolLit { .. }
        | Tm::NaturalLit { .. }
        | Tm::IntegerLit { .. }
        | Tm::DoubleLit { .. }
        | Tm::Import { .. } => tm.clone(),
    }
}

#[cfg(test)]
mod test {
    use super::parse;
    use crate::core::Tm;

    #[test]
    fn unbound_is_free() {
        let tm = parse("λ(x : Type) → y").unwrap();

        assert!(matches!(tm, Tm::Lam { body, .. } if matches!(body.as_ref(), Tm::Free { .. })))
    }

    #[test]
    fn shadowed_index() {
        insta::assert_snapshot!(parse(r"\(x : Type) -> \(x : Type) -> x@1").unwrap(), @"λ(x : Type) → λ(x : Type) → x@1")
    }

    #[test]
    fn precedence() {
        insta::assert_snapshot!(parse("1 + 2 * 3 == x || y").unwrap(), @"1 + 2 * 3 == x || y")
    }

    #[test]
    fn explicit_parens_kept_where_needed() {
        insta::assert_snapshot!(parse("(1 + 2) * 3").unwrap(), @"(1 + 2) * 3")
    }

    #[test]
    fn let_chain() {
        insta::assert_snapshot!(parse("let x = 1 let y : Natural = x in y").unwrap(), @"let x = 1 in let y : Natural = x in y")
    }

    #[test]
    fn application_and_selection() {
        insta::assert_snapshot!(parse("f r.a r.{ b, c } (Some 1)").unwrap(), @"f r.a r.{ b, c } (Some 1)")
    }

    #[test]
    fn comments() {
        insta::assert_snapshot!(parse("{- a {- nested -} comment -} 1 -- trailing").unwrap(), @"1")
    }

    #[test]
    fn literals() {
        insta::assert_snapshot!(
            parse(r#"[+1, -2, 0x10, 1.5, -Infinity, "a\n${x}b"]"#).unwrap(),
            @r#"[+1, -2, 16, 1.5, -Infinity, "a\n${x}b"]"#
        )
    }

    #[test]
    fn natural_bases() {
        insta::assert_snapshot!(parse("[017, 0x1F, 0, 10]").unwrap(), @"[15, 31, 0, 10]")
    }

    #[test]
    fn records_and_unions() {
        insta::assert_snapshot!(
            parse("[{=}, {}, { a = 1 }, { a : Bool }, < A : Natural | B >]").unwrap(),
            @"[{=}, {}, { a = 1 }, { a : Bool }, < A : Natural | B >]"
        )
    }

    #[test]
    fn merge_keeps_annotation() {
        let tm = parse("merge { A = 1 } x : Natural").unwrap();

        assert!(matches!(tm, Tm::Merge { ann: Some(_), .. }))
    }

    #[test]
    fn empty_list() {
        insta::assert_snapshot!(parse("[] : List Natural").unwrap(), @"[] : List Natural")
    }

    #[test]
    fn prefer_is_not_an_import() {
        insta::assert_snapshot!(parse("{ a = 1 } // { b = 2 }").unwrap(), @"{ a = 1 } ⫽ { b = 2 }")
    }

    #[test]
    fn import() {
        assert!(matches!(parse("./package.dhall"), Ok(Tm::Import { .. })))
    }

    #[test]
    fn error() {
        assert!(parse("λ(x : Type) →").is_err())
    }
}
