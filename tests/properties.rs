use pretty_assertions::assert_eq;

use texpand::{
    ArgSpec, CallError, Config, Error, MacroDefinition, MacroRegistry, NodeKind, ParseError,
    Processor, Tree, parse,
};

fn resolved(source: &str) -> String {
    parse(source).unwrap().to_text()
}

fn count(tree: &Tree, pred: impl Fn(&NodeKind) -> bool) -> usize {
    tree.descendants(tree.root())
        .into_iter()
        .filter(|&id| pred(tree.kind(id)))
        .count()
}

#[test]
fn scope_pairs_balance() {
    let sources = [
        "{}",
        "a {b {c {d}}} e",
        "\\begin{x}{1}{2}\\end{x}",
        "\\cmd{ {x} }[{y}] {\\em z}",
    ];
    for source in sources {
        let tree = Processor::new().build(source).unwrap();
        let begins = count(&tree, |k| matches!(k, NodeKind::BeginScope { .. }));
        let ends = count(&tree, |k| matches!(k, NodeKind::EndScope { .. }));
        assert_eq!(begins, ends, "{source}");
    }
}

#[test]
fn flattening_plain_text() {
    let source = "Some   text,\twith % a comment\nspaces.\n\n\n\nNext  paragraph.";
    assert_eq!(
        resolved(source),
        "Some text, with spaces.\n\nNext paragraph."
    );
}

#[test]
fn greet_with_one_argument() {
    assert_eq!(
        resolved("\\newcommand{\\greet}{Hello #1!}\\greet{World}"),
        "Hello World!"
    );
}

#[test]
fn greet_with_optional_default() {
    let definition = "\\newcommand{\\greet}[2][Friend]{Hi #1, #2}";
    assert_eq!(
        resolved(&format!("{definition}\\greet{{Bob}}")),
        "Hi Friend, Bob"
    );
    assert_eq!(
        resolved(&format!("{definition}\\greet[Alice]{{Bob}}")),
        "Hi Alice, Bob"
    );
}

#[test]
fn xparse_optional_slot() {
    let definition = "\\NewDocumentCommand{\\box}{m o}{[#1|#2]}";
    assert_eq!(resolved(&format!("{definition}\\box{{x}}")), "[x|]");
    assert_eq!(resolved(&format!("{definition}\\box{{x}}[y]")), "[x|y]");

    let paired = "\\NewDocumentCommand\\box{m o}{[#1|#2]}";
    assert_eq!(resolved(&format!("{paired}\\box{{x}}[y]")), "[x|y]");
}

#[test]
fn renewcommand_wins_for_later_calls() {
    assert_eq!(
        resolved("\\newcommand{\\x}{old}\\renewcommand{\\x}{new}\\x"),
        "new"
    );
}

#[test]
fn mismatched_environment_is_a_parse_error() {
    let err = parse("\\begin{itemize} a \\end{enumerate}").unwrap_err();
    assert!(matches!(
        err,
        Error::Parse(ParseError::EnvironmentMismatch { .. })
    ));
}

#[test]
fn too_few_parameters_names_the_macro() {
    let err = parse("\\newcommand{\\pair}[2]{#1 and #2}\\pair{a}").unwrap_err();
    match err {
        Error::Call(call) => {
            assert_eq!(call.name(), "pair");
            assert!(call.to_string().contains("\\pair"));
        }
        other => panic!("Expected call error, got {:?}", other),
    }
}

#[test]
fn expansion_inside_environment_and_parameters() {
    let source = "\\newcommand{\\n}{N}\n\\begin{quote}\\textbf{\\n}\\end{quote}";
    let tree = parse(source).unwrap();
    assert_eq!(tree.to_text(), " N");
    let env = tree.children(tree.root())[1];
    assert_eq!(tree.kind(env), &NodeKind::Environment("quote".to_string()));
}

#[test]
fn host_macros_override_source() {
    let mut extra = MacroRegistry::new();
    extra.load("\\newcommand{\\name}{Host}").unwrap();
    let mut body = Tree::new();
    let root = body.root();
    body.append(root, NodeKind::Text("<".to_string()));
    body.append(root, NodeKind::Placeholder(1));
    body.append(root, NodeKind::Text(">".to_string()));
    extra.define(MacroDefinition::new("tag", vec![ArgSpec::Mandatory], body));

    let processor = Processor::new().with_macros(extra);
    let tree = processor
        .process("\\newcommand{\\name}{Source}\\tag{\\name}")
        .unwrap();
    assert_eq!(tree.to_text(), "<Host>");
}

#[test]
fn one_tree_many_resolutions() {
    let tree = Processor::new().build("\\x").unwrap();

    let mut first = MacroRegistry::new();
    first.load("\\newcommand{\\x}{one}").unwrap();
    let mut second = MacroRegistry::new();
    second.load("\\newcommand{\\x}{two}").unwrap();

    let one = Processor::new().with_macros(first).resolve(&tree).unwrap();
    let two = Processor::new().with_macros(second).resolve(&tree).unwrap();
    assert_eq!(one.to_text(), "one");
    assert_eq!(two.to_text(), "two");
    assert_eq!(tree.kind(tree.children(tree.root())[0]).command_name(), Some("x"));
}

#[test]
fn runaway_recursion_is_bounded() {
    let processor = Processor::new().with_config(Config::default().with_max_expansion_depth(10));
    let err = processor
        .process("\\newcommand{\\a}{\\b}\\newcommand{\\b}{\\a}\\a")
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Call(CallError::ExpansionTooDeep { limit: 10, .. })
    ));
}

#[test]
fn deep_recursive_body_is_an_error() {
    let source = format!(
        "\\newcommand{{\\r}}[1]{{{}\\r{{#1}}{}}}\\r{{a}}",
        "\\x{".repeat(120),
        "}".repeat(120)
    );
    assert!(Processor::new().build(&source).is_ok());

    let err = Processor::new().process(&source).unwrap_err();
    assert_eq!(
        err,
        Error::Call(CallError::NestingTooDeep {
            name: "r".to_string(),
            limit: 256
        })
    );
}

#[test]
fn errors_render_with_location() {
    let err = parse("text\n\\newcommand{\\x}[many]{y}").unwrap_err();
    assert_eq!(
        err.to_string(),
        "can’t parse number of arguments “many” at line 2, column 1"
    );
}
