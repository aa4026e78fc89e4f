use super::{Expr, ExprKind};

/// The algebraic rewrites applied while the parser builds the tree.
///
/// Each constructor hands back a tree observationally equivalent to the one
/// it was given, at the active optimization level:
/// - O1: constant propagation, double negation, De Morgan's laws, and
///   short-circuit collapse around known constants
/// - O2: purity-based elimination of subtrees whose result is unused
/// - O4: replacing a fully pure command line with `-false` (the evaluator
///   then skips the walk entirely)
#[derive(Debug, Clone, Copy)]
pub struct Optimizer {
    pub optlevel: i32,
    pub debug: bool,
}

fn fake_argv(token: &str) -> Vec<String> {
    vec![token.to_owned()]
}

impl Optimizer {
    fn note(&self, level: i32, rule: &str, before: &str, after: &Expr) {
        if self.debug {
            eprintln!("-O{level}: {rule}: {before} <==> {after}");
        }
    }

    /// Describe a would-be node for the rewrite log.
    fn describe(argv: &[String], parts: &[&Expr]) -> String {
        let mut out = String::from("(");
        out.push_str(&argv.join(" "));
        for part in parts {
            out.push(' ');
            out.push_str(&part.to_string());
        }
        out.push(')');
        out
    }

    pub fn new_not_expr(&self, rhs: Box<Expr>, argv: Vec<String>) -> Box<Expr> {
        if self.optlevel >= 1 {
            if rhs.is_true() {
                let expr = Expr::constant(false);
                self.note(1, "constant propagation", &Self::describe(&argv, &[&rhs]), &expr);
                return expr;
            }
            if rhs.is_false() {
                let expr = Expr::constant(true);
                self.note(1, "constant propagation", &Self::describe(&argv, &[&rhs]), &expr);
                return expr;
            }
            if rhs.is_not() {
                let description = Self::describe(&argv, &[&rhs]);
                let inner = rhs.rhs.expect("a negation has an operand");
                self.note(1, "double negation", &description, &inner);
                return inner;
            }
            if matches!(rhs.kind, ExprKind::And | ExprKind::Or)
                && (rhs.lhs.as_ref().is_some_and(|lhs| lhs.is_not())
                    || rhs.rhs.as_ref().is_some_and(|inner| inner.is_not()))
            {
                // !(a and b) <==> (!a or !b), and dually
                let description = Self::describe(&argv, &[&rhs]);
                let was_or = matches!(rhs.kind, ExprKind::Or);
                let lhs = rhs.lhs.expect("binary operators have two operands");
                let inner_rhs = rhs.rhs.expect("binary operators have two operands");

                let other_lhs = self.new_not_expr(lhs, argv.clone());
                let other_rhs = self.new_not_expr(inner_rhs, argv);

                let rewritten = if was_or {
                    self.new_and_expr(other_lhs, other_rhs, fake_argv("-a"))
                } else {
                    self.new_or_expr(other_lhs, other_rhs, fake_argv("-o"))
                };
                self.note(1, "De Morgan's laws", &description, &rewritten);
                return rewritten;
            }
        }

        let mut expr = Expr::new_unary(ExprKind::Not, rhs, argv);
        let rhs = expr.rhs.as_ref().expect("just attached");
        expr.always_true = rhs.always_false;
        expr.always_false = rhs.always_true;
        expr
    }

    pub fn new_and_expr(&self, lhs: Box<Expr>, rhs: Box<Expr>, argv: Vec<String>) -> Box<Expr> {
        if self.optlevel >= 1 {
            if lhs.is_true() {
                self.note(1, "conjunction elimination", &Self::describe(&argv, &[&lhs, &rhs]), &rhs);
                return rhs;
            }
            if rhs.is_true() {
                self.note(1, "conjunction elimination", &Self::describe(&argv, &[&lhs, &rhs]), &lhs);
                return lhs;
            }
            if lhs.always_false {
                self.note(1, "short-circuit", &Self::describe(&argv, &[&lhs, &rhs]), &lhs);
                return lhs;
            }
            if self.optlevel >= 2 && rhs.always_false && lhs.pure {
                self.note(2, "purity", &Self::describe(&argv, &[&lhs, &rhs]), &rhs);
                return rhs;
            }
            if lhs.is_not() && rhs.is_not() {
                // (!a and !b) <==> !(a or b)
                let description = Self::describe(&argv, &[&lhs, &rhs]);
                let not_argv = lhs.argv.clone();
                let inner_lhs = lhs.rhs.expect("a negation has an operand");
                let inner_rhs = rhs.rhs.expect("a negation has an operand");

                let or_expr = self.new_or_expr(inner_lhs, inner_rhs, fake_argv("-o"));
                let rewritten = self.new_not_expr(or_expr, not_argv);
                self.note(1, "De Morgan's laws", &description, &rewritten);
                return rewritten;
            }
        }

        let mut expr = Expr::new_binary(ExprKind::And, lhs, rhs, argv);
        let (lhs, rhs) = (
            expr.lhs.as_ref().expect("just attached"),
            expr.rhs.as_ref().expect("just attached"),
        );
        expr.always_true = lhs.always_true && rhs.always_true;
        expr.always_false = lhs.always_false || rhs.always_false;
        expr
    }

    pub fn new_or_expr(&self, lhs: Box<Expr>, rhs: Box<Expr>, argv: Vec<String>) -> Box<Expr> {
        if self.optlevel >= 1 {
            if lhs.always_true {
                self.note(1, "short-circuit", &Self::describe(&argv, &[&lhs, &rhs]), &lhs);
                return lhs;
            }
            if lhs.is_false() {
                self.note(1, "disjunctive syllogism", &Self::describe(&argv, &[&lhs, &rhs]), &rhs);
                return rhs;
            }
            if rhs.is_false() {
                self.note(1, "disjunctive syllogism", &Self::describe(&argv, &[&lhs, &rhs]), &lhs);
                return lhs;
            }
            if self.optlevel >= 2 && rhs.always_true && lhs.pure {
                self.note(2, "purity", &Self::describe(&argv, &[&lhs, &rhs]), &rhs);
                return rhs;
            }
            if lhs.is_not() && rhs.is_not() {
                // (!a or !b) <==> !(a and b)
                let description = Self::describe(&argv, &[&lhs, &rhs]);
                let not_argv = lhs.argv.clone();
                let inner_lhs = lhs.rhs.expect("a negation has an operand");
                let inner_rhs = rhs.rhs.expect("a negation has an operand");

                let and_expr = self.new_and_expr(inner_lhs, inner_rhs, fake_argv("-a"));
                let rewritten = self.new_not_expr(and_expr, not_argv);
                self.note(1, "De Morgan's laws", &description, &rewritten);
                return rewritten;
            }
        }

        let mut expr = Expr::new_binary(ExprKind::Or, lhs, rhs, argv);
        let (lhs, rhs) = (
            expr.lhs.as_ref().expect("just attached"),
            expr.rhs.as_ref().expect("just attached"),
        );
        expr.always_true = lhs.always_true || rhs.always_true;
        expr.always_false = lhs.always_false && rhs.always_false;
        expr
    }

    pub fn new_comma_expr(&self, lhs: Box<Expr>, rhs: Box<Expr>, argv: Vec<String>) -> Box<Expr> {
        let mut lhs = lhs;
        if self.optlevel >= 1 {
            if lhs.is_not() {
                // The left result is discarded, so the negation is dead
                let description = Self::describe(&argv, &[&lhs, &rhs]);
                lhs = lhs.rhs.expect("a negation has an operand");
                self.note(1, "ignored result", &description, &lhs);
            }

            if self.optlevel >= 2 && lhs.pure {
                self.note(2, "purity", &Self::describe(&argv, &[&lhs, &rhs]), &rhs);
                return rhs;
            }
        }

        let mut expr = Expr::new_binary(ExprKind::Comma, lhs, rhs, argv);
        let rhs = expr.rhs.as_ref().expect("just attached");
        expr.always_true = rhs.always_true;
        expr.always_false = rhs.always_false;
        expr
    }

    /// The top-level pass, run once the whole command line is parsed.
    pub fn optimize_whole(&self, expr: Box<Expr>) -> Box<Expr> {
        let mut expr = expr;

        if self.optlevel >= 2 {
            // A trailing pure operand of the last and/or/comma can't be
            // observed; peel until a side effect shows up
            while matches!(expr.kind, ExprKind::And | ExprKind::Or | ExprKind::Comma)
                && expr.rhs.as_ref().is_some_and(|rhs| rhs.pure)
            {
                let description = expr.to_string();
                expr = expr.lhs.expect("binary operators have two operands");
                self.note(2, "top-level purity", &description, &expr);
            }
        }

        if self.optlevel >= 4 && expr.pure && !expr.is_false() {
            let description = expr.to_string();
            expr = Expr::constant(false);
            self.note(4, "top-level purity", &description, &expr);
        }

        expr
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{CmpMode, IntCmp};

    fn opt(level: i32) -> Optimizer {
        Optimizer {
            optlevel: level,
            debug: false,
        }
    }

    fn pure_test() -> Box<Expr> {
        Expr::new(
            ExprKind::Depth {
                cmp: IntCmp {
                    mode: CmpMode::Exact,
                    value: 1,
                },
            },
            true,
            vec!["-depth".to_owned(), "1".to_owned()],
        )
    }

    fn action() -> Box<Expr> {
        // Stands in for -prune: impure, no output file needed
        Expr::new(ExprKind::Prune, false, vec!["-prune".to_owned()])
    }

    #[test]
    fn constant_propagation() {
        let optimizer = opt(1);
        let not_true = optimizer.new_not_expr(Expr::constant(true), vec!["!".to_owned()]);
        assert!(not_true.is_false());

        let not_false = optimizer.new_not_expr(Expr::constant(false), vec!["!".to_owned()]);
        assert!(not_false.is_true());
    }

    #[test]
    fn double_negation() {
        let optimizer = opt(1);
        let test = pure_test();
        let once = optimizer.new_not_expr(test, vec!["!".to_owned()]);
        let twice = optimizer.new_not_expr(once, vec!["!".to_owned()]);
        assert!(matches!(
            twice.kind,
            ExprKind::Depth { .. }
        ));
    }

    #[test]
    fn no_rewrites_at_o0() {
        let optimizer = opt(0);
        let not_true = optimizer.new_not_expr(Expr::constant(true), vec!["!".to_owned()]);
        assert!(not_true.is_not());
        assert!(not_true.always_false);
    }

    #[test]
    fn conjunction_elimination() {
        let optimizer = opt(1);
        let and = optimizer.new_and_expr(Expr::constant(true), action(), vec!["-a".to_owned()]);
        assert!(matches!(and.kind, ExprKind::Prune));
    }

    #[test]
    fn short_circuit_drops_unreachable_actions() {
        // (-false -a -print) never runs the action, so O1 may drop it
        let optimizer = opt(1);
        let and = optimizer.new_and_expr(Expr::constant(false), action(), vec!["-a".to_owned()]);
        assert!(and.is_false());
    }

    #[test]
    fn impure_lhs_survives() {
        let optimizer = opt(2);
        let and = optimizer.new_and_expr(action(), Expr::constant(false), vec!["-a".to_owned()]);
        assert!(matches!(and.kind, ExprKind::And));
        assert!(and.always_false);
    }

    #[test]
    fn purity_elimination_at_o2() {
        let optimizer = opt(2);
        let and = optimizer.new_and_expr(pure_test(), Expr::constant(false), vec!["-a".to_owned()]);
        assert!(and.is_false());

        let comma = optimizer.new_comma_expr(pure_test(), action(), vec![",".to_owned()]);
        assert!(matches!(comma.kind, ExprKind::Prune));
    }

    #[test]
    fn de_morgan() {
        let optimizer = opt(1);
        let lhs = optimizer.new_not_expr(pure_test(), vec!["!".to_owned()]);
        let rhs = optimizer.new_not_expr(pure_test(), vec!["!".to_owned()]);
        let and = optimizer.new_and_expr(lhs, rhs, vec!["-a".to_owned()]);

        // (!a and !b) became !(a or b)
        assert!(and.is_not());
        assert!(matches!(
            and.rhs.as_ref().unwrap().kind,
            ExprKind::Or
        ));
    }

    #[test]
    fn whole_expr_o4() {
        let optimizer = opt(4);
        let pure = optimizer.new_and_expr(pure_test(), pure_test(), vec!["-a".to_owned()]);
        let optimized = optimizer.optimize_whole(pure);
        assert!(optimized.is_false());

        let optimizer = opt(3);
        let with_action =
            optimizer.new_and_expr(pure_test(), action(), vec!["-a".to_owned()]);
        let optimized = optimizer.optimize_whole(with_action);
        assert!(matches!(optimized.kind, ExprKind::And));
    }

    #[test]
    fn top_level_trailing_purity() {
        let optimizer = opt(2);
        let expr = Expr::new_binary(
            ExprKind::And,
            action(),
            pure_test(),
            vec!["-a".to_owned()],
        );
        let optimized = optimizer.optimize_whole(expr);
        assert!(matches!(optimized.kind, ExprKind::Prune));
    }
}
