//! Lowering from the parser's AST to the runtime [`Expr`] tree.
//!
//! Interns every name, turns spans into [`PosIdx`] handles and rejects
//! duplicate attribute or `let` names. Errors are collected so one pass
//! reports every duplicate.

use super::{Binding, Expression, Span, Spanned, TextPart};
use crate::error::Diagnostic;
use crate::expr::{AttrDef, AttrName, BinOp, Expr, ExprKind};
use crate::position::{OriginId, PosIdx, PosTable};
use crate::symbol::SymbolTable;
use rustc_hash::FxHashMap;
use std::rc::Rc;

pub(super) fn lower(
    expression: &Spanned<Expression<'_>>,
    origin: OriginId,
    symbols: &mut SymbolTable,
    positions: &mut PosTable,
) -> Result<Rc<Expr>, Vec<Diagnostic>> {
    let mut lowering = Lowering {
        origin,
        symbols,
        positions,
        errors: Vec::new(),
    };
    let expr = lowering.expression(expression);
    if lowering.errors.is_empty() {
        Ok(expr)
    } else {
        Err(lowering.errors)
    }
}

struct Lowering<'a> {
    origin: OriginId,
    symbols: &'a mut SymbolTable,
    positions: &'a mut PosTable,
    errors: Vec<Diagnostic>,
}

impl Lowering<'_> {
    fn pos(&mut self, span: Span) -> PosIdx {
        self.positions.add(self.origin, span.start)
    }

    fn expression(&mut self, expression: &Spanned<Expression<'_>>) -> Rc<Expr> {
        let pos = self.pos(expression.span);
        let kind = match &expression.node {
            Expression::Int(number) => ExprKind::Int(*number),
            Expression::Float(number) => ExprKind::Float(*number),
            Expression::Text(parts) => return self.text(pos, parts),
            Expression::Variable(name) => ExprKind::Var(self.symbols.create(name)),
            Expression::Select { base, path } => ExprKind::Select {
                base: self.expression(base),
                path: self.path(path),
            },
            Expression::Record { bindings } => ExprKind::Attrs(self.bindings(bindings)),
            Expression::List { items } => {
                ExprKind::List(items.iter().map(|item| self.expression(item)).collect())
            }
            Expression::Let { bindings, body } => ExprKind::Let {
                bindings: self.bindings(bindings),
                body: self.expression(body),
            },
            Expression::Apply { function, argument } => ExprKind::Apply {
                function: self.expression(function),
                argument: self.expression(argument),
            },
            // `-x` is `0 - x`
            Expression::Negate { operand } => ExprKind::BinOp {
                op: BinOp::Sub,
                lhs: Expr::new(pos, ExprKind::Int(0)),
                rhs: self.expression(operand),
            },
            Expression::BinaryOperator {
                operator,
                operand_a,
                operand_b,
            } => ExprKind::BinOp {
                op: *operator,
                lhs: self.expression(operand_a),
                rhs: self.expression(operand_b),
            },
        };
        Expr::new(pos, kind)
    }

    fn path(&mut self, path: &[Spanned<&str>]) -> Vec<AttrName> {
        path.iter()
            .map(|segment| AttrName {
                name: self.symbols.create(segment.node),
                pos: self.pos(segment.span),
            })
            .collect()
    }

    fn bindings(&mut self, bindings: &[Spanned<Binding<'_>>]) -> Vec<AttrDef> {
        let mut seen: FxHashMap<&str, Span> = FxHashMap::default();
        let mut defs = Vec::with_capacity(bindings.len());
        for binding in bindings {
            let name = &binding.node.name;
            if let Some(first) = seen.insert(name.node, name.span) {
                self.errors.push(Diagnostic {
                    message: format!("attribute '{}' already defined", name.node),
                    reason: format!(
                        "first definition at byte {}, redefined here",
                        first.start
                    ),
                    span: name.span.into_range(),
                });
                continue;
            }
            defs.push(AttrDef {
                name: self.symbols.create(name.node),
                pos: self.pos(name.span),
                value: self.expression(&binding.node.value),
            });
        }
        defs
    }

    fn text(&mut self, pos: PosIdx, parts: &[TextPart<'_>]) -> Rc<Expr> {
        let is_literal = parts
            .iter()
            .all(|part| matches!(part, TextPart::Text(_)));
        if is_literal {
            let text: String = parts
                .iter()
                .filter_map(|part| match part {
                    TextPart::Text(text) => Some(text.as_ref()),
                    TextPart::Interpolation { .. } => None,
                })
                .collect();
            return Expr::new(pos, ExprKind::String(text.into()));
        }

        let parts = parts
            .iter()
            .map(|part| match part {
                TextPart::Text(text) => Expr::new(pos, ExprKind::String(text.as_ref().into())),
                TextPart::Interpolation { path } => {
                    let Some((first, rest)) = path.split_first() else {
                        return Expr::new(pos, ExprKind::String("".into()));
                    };
                    let var_pos = self.pos(first.span);
                    let var = Expr::new(var_pos, ExprKind::Var(self.symbols.create(first.node)));
                    if rest.is_empty() {
                        var
                    } else {
                        Expr::new(
                            var_pos,
                            ExprKind::Select {
                                base: var,
                                path: self.path(rest),
                            },
                        )
                    }
                }
            })
            .collect();
        Expr::new(pos, ExprKind::Interpolate(parts))
    }
}
