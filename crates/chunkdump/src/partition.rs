//! Boundary tuples to disjoint, gapless chunk predicates.
//!
//! For key columns `c` and sorted tuples `t1..tM` the output is the `M + 1`
//! predicates `c < t1`, `t1 <= c < t2`, ..., `c >= tM` under lexicographic
//! tuple order. Every row matches exactly one of them.

use std::cmp::Ordering;

use crate::core::identifier::quote_all;
use crate::core::schema::BoundaryTuple;
use crate::error::{DumpError, Result};

const LESS: char = '<';
const GREATER: char = '>';
const EQUAL: char = '=';

/// Render the chunk predicates for `columns` split at `tuples`.
///
/// Returns an empty list when there are no tuples; the caller then dumps the
/// table as one chunk.
pub fn build_where_clauses<S: AsRef<str>>(
    columns: &[S],
    tuples: &[BoundaryTuple],
) -> Result<Vec<String>> {
    if columns.is_empty() {
        return Err(DumpError::PartitionerInvariant(
            "ordering key has no columns".to_string(),
        ));
    }
    if tuples.is_empty() {
        return Ok(Vec::new());
    }
    check_tuples(columns.len(), tuples)?;

    let quoted = quote_all(columns);
    let mut clauses = Vec::with_capacity(tuples.len() + 1);

    let mut buf = String::new();
    write_compare(&mut buf, &quoted, &tuples[0], LESS, false);
    clauses.push(std::mem::take(&mut buf));

    for pair in tuples.windows(2) {
        write_between(&mut buf, &quoted, &pair[0], &pair[1]);
        clauses.push(std::mem::take(&mut buf));
    }

    write_compare(&mut buf, &quoted, &tuples[tuples.len() - 1], GREATER, true);
    clauses.push(buf);

    Ok(clauses)
}

fn check_tuples(arity: usize, tuples: &[BoundaryTuple]) -> Result<()> {
    for (i, tuple) in tuples.iter().enumerate() {
        if tuple.len() != arity {
            return Err(DumpError::PartitionerInvariant(format!(
                "boundary tuple {} has {} values, expected {}",
                i,
                tuple.len(),
                arity
            )));
        }
    }
    if let Some(i) = first_out_of_order(tuples) {
        return Err(DumpError::PartitionerInvariant(format!(
            "boundary tuples {} and {} are out of order: {:?} > {:?}",
            i,
            i + 1,
            tuples[i],
            tuples[i + 1]
        )));
    }
    Ok(())
}

/// Index of the first tuple that sorts after its successor.
///
/// Only numeric tuples are compared; see [`numeric_order`].
pub fn first_out_of_order(tuples: &[BoundaryTuple]) -> Option<usize> {
    tuples
        .windows(2)
        .position(|pair| numeric_order(&pair[0], &pair[1]) == Some(Ordering::Greater))
}

/// Lexicographic order of two tuples when every value is a number.
///
/// Quoted and hex literals have server-side collation, so they are not checked.
fn numeric_order(a: &[String], b: &[String]) -> Option<Ordering> {
    for (x, y) in a.iter().zip(b) {
        let x: f64 = x.parse().ok()?;
        let y: f64 = y.parse().ok()?;
        match x.partial_cmp(&y)? {
            Ordering::Equal => continue,
            other => return Some(other),
        }
    }
    Some(Ordering::Equal)
}

/// `cols <cmp> bound` in lexicographic order.
///
/// `(LESS, false)` renders `(-inf, bound)`; `(GREATER, true)` renders `[bound, +inf)`.
fn write_compare(buf: &mut String, cols: &[String], bound: &[String], cmp: char, inclusive_last: bool) {
    let last = cols.len() - 1;
    for (i, col) in cols.iter().enumerate() {
        if i > 0 {
            buf.push_str("or(");
        }
        for j in 0..i {
            buf.push_str(&cols[j]);
            buf.push(EQUAL);
            buf.push_str(&bound[j]);
            buf.push_str(" and ");
        }
        buf.push_str(col);
        buf.push(cmp);
        if inclusive_last && i == last {
            buf.push(EQUAL);
        }
        buf.push_str(&bound[i]);
        if i > 0 {
            buf.push(')');
        } else if i != last {
            buf.push(' ');
        }
    }
}

fn common_len(low: &[String], up: &[String]) -> usize {
    low.iter()
        .zip(up)
        .position(|(l, u)| l != u)
        .unwrap_or(low.len())
}

/// `low <= cols < up` in lexicographic order.
fn write_between(buf: &mut String, cols: &[String], low: &[String], up: &[String]) {
    let common = common_len(low, up);
    if common == low.len() {
        // Duplicate boundary: the interval is empty.
        buf.push_str("false");
        return;
    }

    let (cols, low, up) = if common > 0 {
        for i in 0..common {
            if i > 0 {
                buf.push_str(" and ");
            }
            buf.push_str(&cols[i]);
            buf.push(EQUAL);
            buf.push_str(&low[i]);
        }
        buf.push_str(" and(");
        (&cols[common..], &low[common..], &up[common..])
    } else {
        (cols, low, up)
    };

    let single_between = |buf: &mut String, inclusive_low: bool| {
        buf.push_str(&cols[0]);
        buf.push(GREATER);
        if inclusive_low {
            buf.push(EQUAL);
        }
        buf.push_str(&low[0]);
        buf.push_str(" and ");
        buf.push_str(&cols[0]);
        buf.push(LESS);
        buf.push_str(&up[0]);
    };

    if cols.len() == 1 {
        single_between(buf, true);
    } else {
        buf.push('(');
        single_between(buf, false);
        buf.push_str(")or(");
        buf.push_str(&cols[0]);
        buf.push(EQUAL);
        buf.push_str(&low[0]);
        buf.push_str(" and(");
        write_compare(buf, &cols[1..], &low[1..], GREATER, true);
        buf.push_str("))or(");
        buf.push_str(&cols[0]);
        buf.push(EQUAL);
        buf.push_str(&up[0]);
        buf.push_str(" and(");
        write_compare(buf, &cols[1..], &up[1..], LESS, false);
        buf.push_str("))");
    }

    if common > 0 {
        buf.push(')');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn tuples(values: &[&[&str]]) -> Vec<BoundaryTuple> {
        values
            .iter()
            .map(|t| t.iter().map(|v| v.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_single_column() {
        let clauses = build_where_clauses(&["a"], &tuples(&[&["1"]])).unwrap();
        assert_eq!(clauses, vec!["`a`<1", "`a`>=1"]);

        let clauses = build_where_clauses(&["a"], &tuples(&[&["1"], &["2"], &["3"]])).unwrap();
        assert_eq!(
            clauses,
            vec!["`a`<1", "`a`>=1 and `a`<2", "`a`>=2 and `a`<3", "`a`>=3"]
        );
    }

    #[test]
    fn test_two_columns() {
        let clauses = build_where_clauses(&["a", "b"], &tuples(&[&["1", "2"]])).unwrap();
        assert_eq!(
            clauses,
            vec!["`a`<1 or(`a`=1 and `b`<2)", "`a`>1 or(`a`=1 and `b`>=2)"]
        );
    }

    #[test]
    fn test_three_columns_with_common_prefix() {
        let clauses = build_where_clauses(
            &["a", "b", "c"],
            &tuples(&[&["1", "2", "3"], &["1", "4", "5"]]),
        )
        .unwrap();
        assert_eq!(
            clauses,
            vec![
                "`a`<1 or(`a`=1 and `b`<2)or(`a`=1 and `b`=2 and `c`<3)",
                "`a`=1 and((`b`>2 and `b`<4)or(`b`=2 and(`c`>=3))or(`b`=4 and(`c`<5)))",
                "`a`>1 or(`a`=1 and `b`>4)or(`a`=1 and `b`=4 and `c`>=5)",
            ]
        );
    }

    #[test]
    fn test_common_prefix_single_suffix() {
        let clauses =
            build_where_clauses(&["a", "b"], &tuples(&[&["1", "2"], &["1", "5"]])).unwrap();
        assert_eq!(clauses[1], "`a`=1 and(`b`>=2 and `b`<5)");
    }

    #[test]
    fn test_string_literals_pass_through() {
        let clauses =
            build_where_clauses(&["name"], &tuples(&[&["'bob'"], &["'carol'"]])).unwrap();
        assert_eq!(
            clauses,
            vec![
                "`name`<'bob'",
                "`name`>='bob' and `name`<'carol'",
                "`name`>='carol'"
            ]
        );
    }

    #[test]
    fn test_duplicate_tuples_render_false() {
        let clauses = build_where_clauses(&["a"], &tuples(&[&["3"], &["3"]])).unwrap();
        assert_eq!(clauses, vec!["`a`<3", "false", "`a`>=3"]);
    }

    #[test]
    fn test_no_tuples() {
        assert!(build_where_clauses(&["a"], &[]).unwrap().is_empty());
    }

    #[test]
    fn test_invariant_violations() {
        let empty: [&str; 0] = [];
        assert!(matches!(
            build_where_clauses(&empty, &tuples(&[&["1"]])),
            Err(DumpError::PartitionerInvariant(_))
        ));
        assert!(matches!(
            build_where_clauses(&["a", "b"], &tuples(&[&["1"]])),
            Err(DumpError::PartitionerInvariant(_))
        ));
        assert!(matches!(
            build_where_clauses(&["a"], &tuples(&[&["5"], &["2"]])),
            Err(DumpError::PartitionerInvariant(_))
        ));
        // Non-numeric literals are not order-checked.
        assert!(build_where_clauses(&["a"], &tuples(&[&["'z'"], &["'a'"]])).is_ok());
    }

    #[test]
    fn test_first_out_of_order() {
        assert_eq!(first_out_of_order(&tuples(&[&["1"], &["2"], &["2"]])), None);
        assert_eq!(first_out_of_order(&tuples(&[&["1"], &["3"], &["2"]])), Some(1));
        assert_eq!(first_out_of_order(&tuples(&[&["1", "9"], &["1", "2"]])), Some(0));
        assert_eq!(first_out_of_order(&tuples(&[&["'b'"], &["'a'"]])), None);
        assert_eq!(first_out_of_order(&[]), None);
    }

    /// Minimal interpreter for the predicate grammar produced above, over integer rows.
    mod eval {
        #[derive(Debug, Clone, PartialEq)]
        enum Tok {
            Col(String),
            Num(i64),
            Op(String),
            And,
            Or,
            False,
            Open,
            Close,
        }

        fn lex(s: &str) -> Vec<Tok> {
            let chars: Vec<char> = s.chars().collect();
            let mut out = Vec::new();
            let mut i = 0;
            while i < chars.len() {
                let c = chars[i];
                match c {
                    ' ' => i += 1,
                    '(' => {
                        out.push(Tok::Open);
                        i += 1;
                    }
                    ')' => {
                        out.push(Tok::Close);
                        i += 1;
                    }
                    '`' => {
                        let end = i + 1 + chars[i + 1..].iter().position(|&c| c == '`').unwrap();
                        out.push(Tok::Col(chars[i + 1..end].iter().collect()));
                        i = end + 1;
                    }
                    '<' | '>' | '=' => {
                        let mut op = c.to_string();
                        if c != '=' && chars.get(i + 1) == Some(&'=') {
                            op.push('=');
                            i += 1;
                        }
                        out.push(Tok::Op(op));
                        i += 1;
                    }
                    '-' | '0'..='9' => {
                        let start = i;
                        i += 1;
                        while i < chars.len() && chars[i].is_ascii_digit() {
                            i += 1;
                        }
                        let n: String = chars[start..i].iter().collect();
                        out.push(Tok::Num(n.parse().unwrap()));
                    }
                    _ => {
                        let start = i;
                        while i < chars.len() && chars[i].is_ascii_alphabetic() {
                            i += 1;
                        }
                        let word: String = chars[start..i].iter().collect();
                        out.push(match word.as_str() {
                            "and" => Tok::And,
                            "or" => Tok::Or,
                            "false" => Tok::False,
                            other => panic!("unexpected word {:?}", other),
                        });
                    }
                }
            }
            out
        }

        struct Parser<'a> {
            toks: Vec<Tok>,
            pos: usize,
            cols: &'a [&'a str],
            row: &'a [i64],
        }

        impl Parser<'_> {
            fn peek(&self) -> Option<&Tok> {
                self.toks.get(self.pos)
            }

            fn next(&mut self) -> Tok {
                let t = self.toks[self.pos].clone();
                self.pos += 1;
                t
            }

            fn or_expr(&mut self) -> bool {
                let mut v = self.and_expr();
                while self.peek() == Some(&Tok::Or) {
                    self.next();
                    let r = self.and_expr();
                    v = v || r;
                }
                v
            }

            fn and_expr(&mut self) -> bool {
                let mut v = self.atom();
                while self.peek() == Some(&Tok::And) {
                    self.next();
                    let r = self.atom();
                    v = v && r;
                }
                v
            }

            fn atom(&mut self) -> bool {
                match self.next() {
                    Tok::Open => {
                        let v = self.or_expr();
                        assert_eq!(self.next(), Tok::Close);
                        v
                    }
                    Tok::False => false,
                    Tok::Col(name) => {
                        let idx = self.cols.iter().position(|c| *c == name).unwrap();
                        let lhs = self.row[idx];
                        let op = match self.next() {
                            Tok::Op(op) => op,
                            t => panic!("expected operator, got {:?}", t),
                        };
                        let rhs = match self.next() {
                            Tok::Num(n) => n,
                            t => panic!("expected number, got {:?}", t),
                        };
                        match op.as_str() {
                            "<" => lhs < rhs,
                            "<=" => lhs <= rhs,
                            ">" => lhs > rhs,
                            ">=" => lhs >= rhs,
                            "=" => lhs == rhs,
                            other => panic!("unknown operator {}", other),
                        }
                    }
                    t => panic!("unexpected token {:?}", t),
                }
            }
        }

        pub fn eval(predicate: &str, cols: &[&str], row: &[i64]) -> bool {
            let mut p = Parser {
                toks: lex(predicate),
                pos: 0,
                cols,
                row,
            };
            let v = p.or_expr();
            assert_eq!(p.pos, p.toks.len(), "trailing tokens in {}", predicate);
            v
        }
    }

    const COLS: [&str; 3] = ["a", "b", "c"];

    fn arb_case() -> impl Strategy<Value = (usize, Vec<Vec<i64>>, Vec<Vec<i64>>)> {
        (1usize..=3).prop_flat_map(|n| {
            (
                Just(n),
                prop::collection::vec(prop::collection::vec(-4i64..4, n), 1..6),
                prop::collection::vec(prop::collection::vec(-5i64..5, n), 1..24),
            )
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn prop_every_row_matches_exactly_one_chunk((n, mut bounds, rows) in arb_case()) {
            bounds.sort();
            let tuples: Vec<BoundaryTuple> = bounds
                .iter()
                .map(|t| t.iter().map(|v| v.to_string()).collect())
                .collect();
            let cols = &COLS[..n];
            let clauses = build_where_clauses(cols, &tuples).unwrap();
            prop_assert_eq!(clauses.len(), tuples.len() + 1);

            for row in &rows {
                let matches: Vec<usize> = clauses
                    .iter()
                    .enumerate()
                    .filter(|(_, c)| eval::eval(c, cols, row))
                    .map(|(i, _)| i)
                    .collect();
                prop_assert_eq!(matches.len(), 1, "row {:?} matched {:?} of {:?}", row, matches, clauses);

                // Chunk k holds rows in [t_k, t_k+1).
                let expected = bounds.iter().filter(|b| b.as_slice() <= row.as_slice()).count();
                prop_assert_eq!(matches[0], expected, "row {:?} in wrong chunk of {:?}", row, clauses);
            }
        }
    }
}
