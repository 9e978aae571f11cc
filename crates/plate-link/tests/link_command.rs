use plate_core::{
    CommandError, Document, Editor, Node, PluginRegistry, Point, Selection, TextNode,
};
use plate_link::{LINK_COMMAND, LinkArgs, LinkConfig, LinkEditing, UNLINK_COMMAND};
use serde_json::json;

fn editor(children: Vec<Node>, selection: Selection) -> Editor {
    editor_with_default(children, selection, false)
}

fn editor_with_default(children: Vec<Node>, selection: Selection, new_tab: bool) -> Editor {
    let config = LinkConfig::default().manual(
        "openInNewTab",
        "Open in a new tab",
        new_tab,
        [("target", "_blank")],
    );
    let link = LinkEditing::new(&config).unwrap();
    let registry = PluginRegistry::with_plugins([link.boxed()]).unwrap();
    Editor::new(Document::new(children), selection, registry)
}

fn point(path: Vec<usize>, offset: usize) -> Point {
    Point::new(path, offset)
}

fn link(editor: &mut Editor, args: LinkArgs) -> Result<(), CommandError> {
    editor.run_command(LINK_COMMAND, Some(serde_json::to_value(args).unwrap()))
}

#[test]
fn selection_across_blocks_is_linked_in_one_step() {
    let mut editor = editor(
        vec![Node::paragraph("abc"), Node::paragraph("def")],
        Selection::new(point(vec![0], 1), point(vec![1], 2)),
    );
    link(&mut editor, LinkArgs::new("T1")).unwrap();

    assert_eq!(
        editor.doc().children,
        vec![
            Node::paragraph_with(vec![
                TextNode::new("a"),
                TextNode::new("bc").with_attr("linkId", "T1"),
            ]),
            Node::paragraph_with(vec![
                TextNode::new("de").with_attr("linkId", "T1"),
                TextNode::new("f"),
            ]),
        ]
    );
    assert_eq!(
        editor.get_data(),
        "<p>a<a class=\"internalLink\" data-elementid=\"T1\">bc</a></p><p><a class=\"internalLink\" data-elementid=\"T1\">de</a>f</p>"
    );

    assert!(editor.undo());
    assert_eq!(
        editor.doc().children,
        vec![Node::paragraph("abc"), Node::paragraph("def")]
    );
}

#[test]
fn collapsed_selection_inside_a_link_retargets_all_of_it() {
    let mut editor = editor(
        vec![Node::paragraph_with(vec![
            TextNode::new("x"),
            TextNode::new("link").with_attr("linkId", "T1"),
            TextNode::new("y"),
        ])],
        Selection::collapsed(point(vec![0], 3)),
    );
    link(&mut editor, LinkArgs::new("T2").decorator("openInNewTab", true)).unwrap();

    assert_eq!(
        editor.doc().children,
        vec![Node::paragraph_with(vec![
            TextNode::new("x"),
            TextNode::new("link")
                .with_attr("linkId", "T2")
                .with_attr("openInNewTab", true),
            TextNode::new("y"),
        ])]
    );
    assert_eq!(editor.selection(), &Selection::collapsed(point(vec![0], 3)));
}

#[test]
fn retargeting_leaves_unrequested_decorators_alone() {
    let linked = |decorated: bool| {
        let leaf = TextNode::new("link").with_attr("linkId", "T1");
        vec![Node::paragraph_with(vec![
            TextNode::new("x"),
            if decorated { leaf.with_attr("openInNewTab", true) } else { leaf },
            TextNode::new("y"),
        ])]
    };

    // Stored `true` survives a `false` default.
    let caret = Selection::collapsed(point(vec![0], 3));
    let mut editor = editor_with_default(linked(true), caret.clone(), false);
    link(&mut editor, LinkArgs::new("T2")).unwrap();
    assert_eq!(
        editor.doc().children,
        vec![Node::paragraph_with(vec![
            TextNode::new("x"),
            TextNode::new("link")
                .with_attr("linkId", "T2")
                .with_attr("openInNewTab", true),
            TextNode::new("y"),
        ])]
    );

    // An undecorated link does not pick up a `true` default.
    let mut editor = editor_with_default(linked(false), caret, true);
    link(&mut editor, LinkArgs::new("T2")).unwrap();
    assert_eq!(
        editor.doc().children,
        vec![Node::paragraph_with(vec![
            TextNode::new("x"),
            TextNode::new("link").with_attr("linkId", "T2"),
            TextNode::new("y"),
        ])]
    );
    assert_eq!(
        editor.get_data(),
        "<p>x<a class=\"internalLink\" data-elementid=\"T2\">link</a>y</p>"
    );

    // Explicit choices still apply.
    link(&mut editor, LinkArgs::new("T2").decorator("openInNewTab", true)).unwrap();
    assert!(editor.get_data().contains("target=\"_blank\""));
}

#[test]
fn collapsed_selection_outside_a_link_inserts_the_target_as_text() {
    let mut editor = editor(vec![Node::paragraph("ab")], Selection::collapsed(point(vec![0], 1)));
    link(&mut editor, LinkArgs::new("T1")).unwrap();

    assert_eq!(
        editor.doc().children,
        vec![Node::paragraph_with(vec![
            TextNode::new("a"),
            TextNode::new("T1").with_attr("linkId", "T1"),
            TextNode::new("b"),
        ])]
    );
    assert_eq!(editor.selection(), &Selection::collapsed(point(vec![0], 3)));
}

#[test]
fn bad_arguments_leave_the_model_untouched() {
    let mut editor = editor(vec![Node::paragraph("ab")], Selection::collapsed(point(vec![0], 1)));

    assert!(matches!(
        link(&mut editor, LinkArgs::new("")),
        Err(CommandError::InvalidArgs(_))
    ));
    assert!(matches!(
        editor.run_command(LINK_COMMAND, None),
        Err(CommandError::InvalidArgs(_))
    ));
    assert!(matches!(
        editor.run_command(LINK_COMMAND, Some(json!({ "label": "no target" }))),
        Err(CommandError::InvalidArgs(_))
    ));
    assert_eq!(editor.doc().children, vec![Node::paragraph("ab")]);
    assert!(!editor.can_undo());
}

#[test]
fn command_states_follow_the_selection() {
    let mut editor = editor(
        vec![Node::paragraph_with(vec![
            TextNode::new("ab"),
            TextNode::new("cd").with_attr("linkId", "T1"),
        ])],
        Selection::collapsed(point(vec![0], 1)),
    );
    let state = editor.command_state(LINK_COMMAND).unwrap();
    assert!(state.enabled);
    assert_eq!(state.value, json!(null));
    assert!(!editor.is_command_enabled(UNLINK_COMMAND));

    editor.set_selection(Selection::collapsed(point(vec![0], 3)));
    assert_eq!(editor.command_state(LINK_COMMAND).unwrap().value, json!("T1"));
    assert!(editor.is_command_enabled(UNLINK_COMMAND));
}

#[test]
fn queries_expose_link_state() {
    let mut editor = editor(
        vec![Node::paragraph_with(vec![
            TextNode::new("ab"),
            TextNode::new("cd")
                .with_attr("linkId", "T1")
                .with_attr("openInNewTab", true),
        ])],
        Selection::collapsed(point(vec![0], 1)),
    );

    assert_eq!(editor.run_query::<Option<String>>("link.value", None).unwrap(), None);
    assert!(!editor.run_query::<bool>("link.is_active", None).unwrap());
    assert_eq!(
        editor.run_query_json("link.decorator_states", None).unwrap(),
        json!({ "openInNewTab": false })
    );

    editor.set_selection(Selection::collapsed(point(vec![0], 3)));
    assert_eq!(
        editor.run_query::<Option<String>>("link.value", None).unwrap(),
        Some("T1".to_string())
    );
    assert!(editor.run_query::<bool>("link.is_active", None).unwrap());
    assert_eq!(
        editor.run_query_json("link.decorator_states", None).unwrap(),
        json!({ "openInNewTab": true })
    );
}
