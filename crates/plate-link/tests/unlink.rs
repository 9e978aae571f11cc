use plate_core::{CommandError, Document, Editor, Node, PluginRegistry, Point, Selection, TextNode};
use plate_link::{LinkConfig, LinkEditing, UNLINK_COMMAND};

/// `Intro` then a link to T1 over 5..12 opening in a new tab, then ` tail`.
fn linked_doc() -> Document {
    Document::new(vec![Node::paragraph_with(vec![
        TextNode::new("Intro"),
        TextNode::new("linked!")
            .with_attr("linkId", "T1")
            .with_attr("openInNewTab", true),
        TextNode::new(" tail"),
    ])])
}

fn editor(selection: Selection) -> Editor {
    let config = LinkConfig::default().manual(
        "openInNewTab",
        "Open in a new tab",
        false,
        [("target", "_blank")],
    );
    let link = LinkEditing::new(&config).unwrap();
    let registry = PluginRegistry::with_plugins([link.boxed()]).unwrap();
    Editor::new(linked_doc(), selection, registry)
}

fn caret(offset: usize) -> Selection {
    Selection::collapsed(Point::new(vec![0], offset))
}

#[test]
fn collapsed_unlink_removes_the_whole_link() {
    let mut editor = editor(caret(8));
    assert!(editor.is_command_enabled(UNLINK_COMMAND));

    editor.run_command(UNLINK_COMMAND, None).unwrap();
    assert_eq!(
        editor.doc().children,
        vec![Node::paragraph("Introlinked! tail")]
    );
    assert_eq!(editor.selection(), &caret(8));
    assert!(!editor.is_command_enabled(UNLINK_COMMAND));
    assert_eq!(editor.get_data(), "<p>Introlinked! tail</p>");
}

#[test]
fn one_undo_restores_link_and_decorators() {
    let mut editor = editor(caret(8));
    editor.run_command(UNLINK_COMMAND, None).unwrap();

    assert!(editor.undo());
    assert_eq!(editor.doc(), &linked_doc());
    assert!(!editor.can_undo());
    assert_eq!(
        editor.get_data(),
        "<p>Intro<a class=\"internalLink\" data-elementid=\"T1\" target=\"_blank\">linked!</a> tail</p>"
    );
}

#[test]
fn non_collapsed_unlink_only_touches_the_selection() {
    let mut editor = editor(Selection::new(
        Point::new(vec![0], 6),
        Point::new(vec![0], 9),
    ));
    editor.run_command(UNLINK_COMMAND, None).unwrap();

    let link = |text: &str| {
        TextNode::new(text)
            .with_attr("linkId", "T1")
            .with_attr("openInNewTab", true)
    };
    assert_eq!(
        editor.doc().children,
        vec![Node::paragraph_with(vec![
            TextNode::new("Intro"),
            link("l"),
            TextNode::new("ink"),
            link("ed!"),
            TextNode::new(" tail"),
        ])]
    );
}

#[test]
fn unlink_outside_a_link_is_disabled() {
    let mut editor = editor(caret(2));
    assert!(!editor.is_command_enabled(UNLINK_COMMAND));

    let err = editor.run_command(UNLINK_COMMAND, None).unwrap_err();
    assert!(matches!(err, CommandError::Disabled(_)));
    assert_eq!(editor.doc(), &linked_doc());
    assert!(!editor.can_undo());
}

#[test]
fn caret_at_the_link_end_still_unlinks() {
    let mut editor = editor(caret(12));
    editor.run_command(UNLINK_COMMAND, None).unwrap();
    assert_eq!(
        editor.doc().children,
        vec![Node::paragraph("Introlinked! tail")]
    );
}
