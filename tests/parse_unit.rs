use posish::ast::{Node, RedirectOp};
use posish::parse::{needs_more_input, Parser};
use posish::{parse, regenerate, ErrorKind};

fn items(node: Node) -> Vec<Node> {
    match node {
        Node::List(items) => items,
        other => panic!("expected a list, got {other:?}"),
    }
}

#[test]
fn pipeline_black_box() {
    let mut list = items(parse("echo hi | cat").unwrap());
    assert_eq!(list.len(), 1);
    let Node::Pipeline(pipeline) = list.remove(0) else {
        panic!("expected a pipeline");
    };
    assert!(!pipeline.negated);
    assert_eq!(pipeline.stages.len(), 2);
    let Node::Command(first) = &pipeline.stages[0] else {
        panic!("expected a command");
    };
    let words: Vec<&str> = first.words.iter().map(|word| word.as_str()).collect();
    assert_eq!(words, ["echo", "hi"]);
}

#[test]
fn and_or_lists_nest_left() {
    let list = items(parse("a && b || c; d").unwrap());
    assert_eq!(list.len(), 2);
    let Node::Or(left, _) = &list[0] else {
        panic!("expected `||` at the top: {:?}", list[0]);
    };
    assert!(matches!(**left, Node::And(_, _)));
}

#[test]
fn redirections_and_heredocs() {
    let list = items(parse("cat <<-EOF 2>>log\n\tbody $x\n\tEOF\n").unwrap());
    let Node::Command(cmd) = &list[0] else {
        panic!("expected a command");
    };
    assert_eq!(cmd.redirects.len(), 2);
    assert_eq!(cmd.redirects[0].op, RedirectOp::HereDoc { strip_tabs: true });
    let heredoc = cmd.redirects[0].heredoc.as_ref().unwrap();
    assert_eq!(heredoc.content, "body $x\n");
    assert!(heredoc.expand);
    assert_eq!(cmd.redirects[1].fd(), 2);
    assert_eq!(cmd.redirects[1].op, RedirectOp::Append);
}

#[test]
fn syntax_errors_have_kind_and_location() {
    let err = parse("echo ok\nfi").unwrap_err();
    assert_eq!(err.kind, ErrorKind::Parse);
    assert_eq!(err.exit_status(), 2);
    assert!(!err.incomplete);

    let mut parser = Parser::new("while true; do");
    assert!(parser.parse_program().is_none());
    assert!(parser.needs_more_input());
    assert!(needs_more_input("for i in a b; do"));
    assert!(!needs_more_input("for i in a b; do :; done"));
}

#[test]
fn regenerated_source_reparses_identically() {
    let sources = [
        "echo 'a b' \"$x\" ${y:-z} $(date) $((1 + 2))",
        "if a; then b; elif c; then d; else e; fi",
        "for i in 1 2; do echo $i; done > out",
        "case $x in a|b) echo ab;; *) ;; esac",
        "f() { local v=1; return $v; }",
        "greet(who, greeting=hello) { echo \"$greeting $who\"; }",
        "! a | b && (c; d) &",
        "{ x; y; } 2>&1 | tee log",
        "cat <<'EOF'\n$literal\nEOF\n",
    ];
    for source in sources {
        let tree = parse(source).unwrap();
        let text = regenerate(&tree);
        assert_eq!(parse(&text).unwrap(), tree, "source {source:?} regenerated as {text:?}");
    }
}

#[test]
fn heredoc_inside_command_substitution() {
    let source = "x=$(cat <<EOF\nit's )\nEOF\n)\necho \"[$x]\" $((1 << 2))\n";
    let list = items(parse(source).unwrap());
    assert_eq!(list.len(), 2);
    let Node::Command(cmd) = &list[0] else {
        panic!("expected a command");
    };
    assert_eq!(cmd.assignments[0].value.as_str(), "$(cat <<EOF\nit's )\nEOF\n)");
    let Node::Command(echo) = &list[1] else {
        panic!("expected a command");
    };
    assert_eq!(echo.words[2].as_str(), "$((1 << 2))");

    let stripped = items(parse("y=$(cat <<-'END' <<<here\n\tbody (\n\tEND\n)").unwrap());
    assert_eq!(stripped.len(), 1);
    assert_eq!(parse(&regenerate(&Node::List(stripped.clone()))).unwrap(), Node::List(stripped));
}
