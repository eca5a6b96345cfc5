//! Call tree construction from a parsed template.
//!
//! Every child of a sequence or branch is built into its own tree and merged
//! into the parent, so the result is the union of all paths the template may
//! touch, regardless of which branch would run.

use tracing::debug;

use crate::error::{CheckerError, Result};
use crate::template::ast::*;
use crate::template::funcs;
use crate::template::parse;

use super::CallTree;

/// Parse `source` and build its call tree.
pub fn build_call_tree(source: &str) -> Result<CallTree> {
    let template = parse(source)?;
    TreeBuilder::new().build(&template)
}

/// Deepest call tree node a template may produce. Counts every field step and
/// every list element step from the root.
pub const MAX_TREE_DEPTH: usize = 256;

/// Walks a template parse tree and records the field paths it uses.
///
/// Every `root` handed down the walk comes with its depth in the final tree,
/// so that overly deep templates fail here instead of in the recursive tree
/// operations downstream.
#[derive(Debug, Default, Clone, Copy)]
pub struct TreeBuilder;

impl TreeBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn build(&self, template: &Template) -> Result<CallTree> {
        let mut root = CallTree::new();
        self.build_list(&mut root, 0, &template.root)?;
        debug!(consistent = root.is_consistent(), "built template call tree");
        Ok(root)
    }

    fn build_list(&self, root: &mut CallTree, depth: usize, list: &ListNode) -> Result<()> {
        for node in &list.nodes {
            let mut subtree = CallTree::new();
            self.build_node(&mut subtree, depth, node)?;
            root.merge(subtree);
        }
        Ok(())
    }

    fn build_node(&self, root: &mut CallTree, depth: usize, node: &Node) -> Result<()> {
        match node {
            Node::Text(_) => Ok(()),
            Node::Action(action) => self.build_pipe(root, depth, &action.pipe),
            Node::If(branch) => self.build_branch(root, depth, branch),
            Node::Range(branch) => self.build_range(root, depth, branch),
            Node::With(_) | Node::Template(_) | Node::Break(_) | Node::Continue(_) => {
                Err(CheckerError::syntax(
                    node.pos(),
                    format!("unrecognized node kind: {}", node.kind_name()),
                ))
            }
        }
    }

    /// Condition, then-branch and else-branch are all merged into `root`.
    fn build_branch(&self, root: &mut CallTree, depth: usize, branch: &BranchNode) -> Result<()> {
        let mut condition = CallTree::new();
        self.build_pipe(&mut condition, depth, &branch.pipe)?;
        root.merge(condition);

        self.build_list(root, depth, &branch.list)?;
        if let Some(else_list) = &branch.else_list {
            self.build_list(root, depth, else_list)?;
        }
        Ok(())
    }

    /// The body describes the iterated element, so it is built inside the list facet
    /// of the range target. The else branch runs in the outer context.
    fn build_range(&self, root: &mut CallTree, depth: usize, branch: &BranchNode) -> Result<()> {
        let target = range_target(&branch.pipe)?;
        let (target_node, target_depth) = descend(root, depth, target, branch.pos)?;
        let (elem, elem_depth) = element(target_node, target_depth, branch.pos)?;
        self.build_list(elem, elem_depth, &branch.list)?;

        if let Some(else_list) = &branch.else_list {
            self.build_list(root, depth, else_list)?;
        }
        Ok(())
    }

    fn build_pipe(&self, root: &mut CallTree, depth: usize, pipe: &PipeNode) -> Result<()> {
        if let Some(field) = direct_index(pipe)? {
            let (node, depth) = descend(root, depth, &field.idents, field.pos)?;
            element(node, depth, field.pos)?;
            return Ok(());
        }

        // Declared variables only name values; they add no field access.
        for cmd in &pipe.cmds {
            for arg in &cmd.args {
                self.build_arg(root, depth, arg)?;
            }
        }
        Ok(())
    }

    fn build_arg(&self, root: &mut CallTree, depth: usize, arg: &Arg) -> Result<()> {
        match arg {
            Arg::Field(field) => descend(root, depth, &field.idents, field.pos).map(|_| ()),
            Arg::Chain(_) => self.resolve(root, depth, arg).map(|_| ()),
            Arg::Pipe(pipe) => self.build_pipe(root, depth, pipe),
            Arg::Dot(_)
            | Arg::Variable(_)
            | Arg::Identifier(_)
            | Arg::String(_)
            | Arg::Number(_)
            | Arg::Bool(..)
            | Arg::Nil(_) => Ok(()),
        }
    }

    /// Build `arg` and return the node standing for the value it evaluates to,
    /// along with its depth, so that a trailing field chain can extend it.
    fn resolve<'t>(
        &self,
        root: &'t mut CallTree,
        depth: usize,
        arg: &Arg,
    ) -> Result<(&'t mut CallTree, usize)> {
        match arg {
            Arg::Dot(_) => Ok((root, depth)),
            Arg::Field(field) => descend(root, depth, &field.idents, field.pos),
            Arg::Chain(chain) => {
                let (node, depth) = self.resolve(root, depth, &chain.node)?;
                descend(node, depth, &chain.fields, chain.pos)
            }
            Arg::Pipe(pipe) => {
                if let Some(field) = direct_index(pipe)? {
                    let (node, depth) = descend(root, depth, &field.idents, field.pos)?;
                    return element(node, depth, field.pos);
                }
                match single_operand(pipe) {
                    Some(inner) => self.resolve(root, depth, inner),
                    None => Err(CheckerError::unsupported(
                        pipe.pos,
                        "field access on the result of a function call",
                    )),
                }
            }
            other => Err(CheckerError::unsupported(
                other.pos(),
                format!("field access on a {} operand", other.kind_name()),
            )),
        }
    }
}

/// `root.field_path(idents)`, refused past [`MAX_TREE_DEPTH`].
fn descend<'t, S: AsRef<str>>(
    root: &'t mut CallTree,
    depth: usize,
    idents: &[S],
    pos: Pos,
) -> Result<(&'t mut CallTree, usize)> {
    let depth = depth + idents.len();
    check_depth(depth, pos)?;
    Ok((root.field_path(idents), depth))
}

/// `root.list_mut()`, refused past [`MAX_TREE_DEPTH`].
fn element(root: &mut CallTree, depth: usize, pos: Pos) -> Result<(&mut CallTree, usize)> {
    let depth = depth + 1;
    check_depth(depth, pos)?;
    Ok((root.list_mut(), depth))
}

fn check_depth(depth: usize, pos: Pos) -> Result<()> {
    if depth > MAX_TREE_DEPTH {
        return Err(CheckerError::syntax(
            pos,
            format!("max field depth exceeded: more than {MAX_TREE_DEPTH} levels"),
        ));
    }
    Ok(())
}

/// The operand of a pipeline made of one command with one argument, like `(.A)`.
fn single_operand(pipe: &PipeNode) -> Option<&Arg> {
    match (pipe.decls.as_slice(), pipe.cmds.as_slice()) {
        ([], [cmd]) => match cmd.args.as_slice() {
            [arg] => Some(arg),
            _ => None,
        },
        _ => None,
    }
}

/// Recognise `index <field> <integer>`.
///
/// `index <field>` with any other number of index arguments cannot be mapped to
/// a single element and is rejected; `index <field> <non-integer>` is left to
/// the generic command handling.
fn direct_index(pipe: &PipeNode) -> Result<Option<&FieldNode>> {
    if !pipe.decls.is_empty() || pipe.cmds.len() != 1 {
        return Ok(None);
    }

    let args = &pipe.cmds[0].args;
    let (Some(Arg::Identifier(func)), Some(Arg::Field(field))) = (args.first(), args.get(1)) else {
        return Ok(None);
    };
    if func.name != funcs::INDEX_FUNC {
        return Ok(None);
    }

    match args.as_slice() {
        [_, _, Arg::Number(number)] if number.is_integer() => Ok(Some(field)),
        [_, _, _] => Ok(None),
        _ => Err(CheckerError::unsupported(
            func.pos,
            format!(
                "{} expects a field and exactly one integer index, got {} argument(s)",
                funcs::INDEX_FUNC,
                args.len() - 1
            ),
        )),
    }
}

/// The field path a `range` iterates over: `.`, `.A.B`, or a passthrough helper
/// wrapping either of those.
fn range_target(pipe: &PipeNode) -> Result<&[String]> {
    let [cmd] = pipe.cmds.as_slice() else {
        return Err(CheckerError::unsupported(
            pipe.pos,
            format!("range over {} commands, expected 1", pipe.cmds.len()),
        ));
    };

    let arg = match cmd.args.as_slice() {
        [arg] => arg,
        [Arg::Identifier(func), arg] if funcs::is_passthrough(&func.name) => arg,
        [Arg::Identifier(func), _] => {
            return Err(CheckerError::unsupported(
                func.pos,
                format!(
                    "range over a call to {:?}, only {} are supported",
                    func.name,
                    funcs::PASSTHROUGH_FUNCS.join(", ")
                ),
            ));
        }
        args => {
            return Err(CheckerError::unsupported(
                cmd.pos,
                format!("range over {} arguments, expected a field", args.len()),
            ));
        }
    };

    match arg {
        Arg::Dot(_) => Ok(&[] as &[String]),
        Arg::Field(field) => Ok(field.idents.as_slice()),
        other => Err(CheckerError::unsupported(
            other.pos(),
            format!("range over a {} operand, expected a field", other.kind_name()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calltree::Facets;

    fn tree(source: &str) -> CallTree {
        build_call_tree(source).unwrap()
    }

    #[test]
    fn test_fields_are_lower_cased() {
        let tree = tree("{{.Name}} {{.Count}}");
        let fields = tree.fields().unwrap();
        assert!(fields.contains_key("name"));
        assert!(fields.contains_key("count"));
    }

    #[test]
    fn test_terminals_contribute_nothing() {
        let tree = tree(r#"text {{.}} {{"s"}} {{1}} {{true}} {{nil}} {{$}}"#);
        assert!(tree.is_leaf());
    }

    #[test]
    fn test_range_builds_inside_list() {
        let tree = tree("{{range .Items}}{{.ID}}{{end}}");
        let items = tree.get(&["items"]).unwrap();
        let elem = items.list().unwrap();
        assert!(elem.get(&["id"]).is_some());
        assert!(items.fields().is_none());
    }

    #[test]
    fn test_range_over_dot() {
        let tree = tree("{{range .}}{{.ID}}{{end}}");
        assert!(matches!(tree.facets(), Facets::List(_)));
        assert!(tree.list().unwrap().get(&["id"]).is_some());
    }

    #[test]
    fn test_range_else_uses_outer_context() {
        let tree = tree("{{range .Items}}{{.Name}}{{else}}{{.Empty}}{{end}}");
        assert!(tree.get(&["empty"]).is_some());
        assert!(tree.get(&["items"]).unwrap().list().unwrap().get(&["empty"]).is_none());
    }

    #[test]
    fn test_range_merges_existing_path() {
        let tree = tree("{{.Items.Total}}{{range .Items}}{{.Name}}{{end}}");
        let items = tree.get(&["items"]).unwrap();
        assert!(matches!(items.facets(), Facets::Conflict { .. }));
    }

    #[test]
    fn test_range_passthrough_helper() {
        let tree = tree("{{range valueOrEmptySlice .Results}}{{.ID}}{{end}}");
        assert!(tree.get(&["results"]).unwrap().list().is_some());
    }

    #[test]
    fn test_range_over_other_function_is_unsupported() {
        let err = build_call_tree("{{range len .Results}}{{end}}").unwrap_err();
        assert!(matches!(err, CheckerError::UnsupportedConstruct { .. }));
    }

    #[test]
    fn test_range_over_pipeline_is_unsupported() {
        let err = build_call_tree("{{range .Results | len}}{{end}}").unwrap_err();
        assert!(matches!(err, CheckerError::UnsupportedConstruct { .. }));
    }

    #[test]
    fn test_nested_ranges() {
        let tree = tree("{{range .Groups}}{{range .Members}}{{.Email}}{{end}}{{end}}");
        let groups = tree.get(&["groups"]).unwrap().list().unwrap();
        let members = groups.get(&["members"]).unwrap().list().unwrap();
        assert!(members.get(&["email"]).is_some());
    }

    #[test]
    fn test_branches_are_merged() {
        let tree = tree("{{if .X}}{{.A.B}}{{else}}{{.A.C}}{{end}}");
        let a = tree.get(&["a"]).unwrap().fields().unwrap();
        assert!(a.contains_key("b"));
        assert!(a.contains_key("c"));
        assert!(tree.get(&["x"]).is_some());
    }

    #[test]
    fn test_pipeline_arguments_are_built() {
        let tree = tree(r#"{{printf "%s-%s" .First .Last | printf "%s"}}"#);
        assert!(tree.get(&["first"]).is_some());
        assert!(tree.get(&["last"]).is_some());
    }

    #[test]
    fn test_declared_variables_are_built() {
        let tree = tree("{{$name := .Owner.Name}}{{$name}}");
        assert!(tree.get(&["owner", "name"]).is_some());
    }

    #[test]
    fn test_direct_index() {
        let tree = tree("{{index .Items 0}}");
        let items = tree.get(&["items"]).unwrap();
        assert!(matches!(items.facets(), Facets::List(_)));
    }

    #[test]
    fn test_direct_index_chain() {
        let tree = tree("{{(index .Results 0).Name}}");
        let elem = tree.get(&["results"]).unwrap().list().unwrap();
        assert!(elem.get(&["name"]).is_some());
    }

    #[test]
    fn test_index_with_string_key_is_generic() {
        let tree = tree(r#"{{index .Labels "env"}}"#);
        assert!(tree.get(&["labels"]).unwrap().is_leaf());
    }

    #[test]
    fn test_index_with_wrong_argument_count() {
        let err = build_call_tree("{{index .Matrix 0 1}}").unwrap_err();
        assert!(matches!(err, CheckerError::UnsupportedConstruct { .. }));
    }

    #[test]
    fn test_parenthesized_field_chain() {
        let tree = tree("{{(.Owner).Name}}");
        assert!(tree.get(&["owner", "name"]).is_some());
    }

    #[test]
    fn test_chain_on_function_result_is_unsupported() {
        let err = build_call_tree(r#"{{(printf "%v" .X).Name}}"#).unwrap_err();
        assert!(matches!(err, CheckerError::UnsupportedConstruct { .. }));
    }

    #[test]
    fn test_with_is_unrecognized() {
        let err = build_call_tree("{{with .Owner}}{{.Name}}{{end}}").unwrap_err();
        assert!(matches!(err, CheckerError::TemplateSyntax { .. }));
    }

    #[test]
    fn test_template_clause_is_unrecognized() {
        let err = build_call_tree(r#"{{template "row" .}}"#).unwrap_err();
        assert!(matches!(err, CheckerError::TemplateSyntax { .. }));
    }

    #[test]
    fn test_long_field_chain_limit() {
        let chain = |n: usize| format!("{{{{{}}}}}", ".A".repeat(n));
        assert!(build_call_tree(&chain(MAX_TREE_DEPTH)).is_ok());

        let err = build_call_tree(&chain(MAX_TREE_DEPTH + 1)).unwrap_err();
        assert!(matches!(err, CheckerError::TemplateSyntax { .. }));
        assert!(err.to_string().contains("max field depth exceeded"));

        assert!(build_call_tree(&chain(10_000)).is_err());
    }

    #[test]
    fn test_depth_adds_up_across_ranges() {
        // 100 ranges over `.A` sit 200 levels deep.
        let nested = |tail: usize| {
            format!(
                "{}{{{{{}}}}}{}",
                "{{range .A}}".repeat(100),
                ".B".repeat(tail),
                "{{end}}".repeat(100)
            )
        };
        assert!(build_call_tree(&nested(MAX_TREE_DEPTH - 200)).is_ok());
        assert!(build_call_tree(&nested(MAX_TREE_DEPTH - 199)).is_err());
    }

    #[test]
    fn test_depth_adds_up_across_chains() {
        let source = format!(
            "{{{{(index .{} 0).{}}}}}",
            vec!["A"; 200].join("."),
            vec!["B"; 56].join(".")
        );
        let err = build_call_tree(&source).unwrap_err();
        assert!(err.to_string().contains("max field depth exceeded"));
    }

    #[test]
    fn test_syntax_errors_propagate() {
        let err = build_call_tree("{{.Name").unwrap_err();
        assert!(matches!(err, CheckerError::TemplateSyntax { .. }));
    }
}
