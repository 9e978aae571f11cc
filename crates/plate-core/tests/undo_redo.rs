use plate_core::{
    ApplyError, Document, Editor, EditorConfig, Node, Op, PluginRegistry, Point, Selection,
    Transaction,
};

fn editor_with_text(text: &str) -> Editor {
    let doc = Document {
        children: vec![Node::paragraph(text)],
    };
    let selection = Selection::collapsed(Point::new(vec![0], text.len()));
    Editor::new(doc, selection, PluginRegistry::core())
}

#[test]
fn undo_redo_handles_multi_op_insert_order() {
    let mut editor = editor_with_text("");

    let tx = Transaction::new(vec![
        Op::insert_text(vec![0], 0, "a", Default::default()),
        Op::insert_text(vec![0], 1, "b", Default::default()),
    ])
    .selection_after(Selection::collapsed(Point::new(vec![0], 2)))
    .source("test:multi_insert");

    editor.apply(tx).unwrap();
    assert_eq!(editor.doc().children, vec![Node::paragraph("ab")]);
    assert_eq!(editor.selection().focus.offset, 2);

    assert!(editor.undo());
    assert_eq!(editor.doc().children, vec![Node::paragraph("")]);
    assert_eq!(editor.selection().focus.offset, 0);

    assert!(editor.redo());
    assert_eq!(editor.doc().children, vec![Node::paragraph("ab")]);
    assert_eq!(editor.selection().focus.offset, 2);
}

#[test]
fn failing_op_rolls_back_the_whole_batch() {
    let mut editor = editor_with_text("XYZ");
    let selection_before = editor.selection().clone();

    let tx = Transaction::new(vec![
        Op::insert_text(vec![0], 0, "a", Default::default()),
        Op::RemoveText {
            path: vec![0],
            range: 2..40,
        },
    ])
    .selection_after(Selection::collapsed(Point::new(vec![0], 1)))
    .source("test:bad_range");

    let err = editor.apply(tx).unwrap_err();
    assert!(matches!(err, ApplyError::InvalidRange { .. }));
    assert_eq!(editor.doc().children, vec![Node::paragraph("XYZ")]);
    assert_eq!(editor.selection(), &selection_before);
    assert!(!editor.can_undo());
    assert_eq!(editor.editing_view().to_markup(), "<p>XYZ</p>");
}

#[test]
fn structural_batches_undo_exactly() {
    let mut editor = editor_with_text("hello");

    editor
        .apply(Transaction::new(vec![
            Op::insert_text(vec![0], 5, " world", Default::default()),
            Op::RemoveNode { path: vec![0] },
            Op::InsertNode {
                path: vec![0],
                node: Node::heading(2, "Title"),
            },
        ]))
        .unwrap();
    assert_eq!(editor.doc().children, vec![Node::heading(2, "Title")]);
    assert_eq!(editor.editing_view().to_markup(), "<h2>Title</h2>");

    assert!(editor.undo());
    assert_eq!(editor.doc().children, vec![Node::paragraph("hello")]);
    assert_eq!(editor.editing_view().to_markup(), "<p>hello</p>");
    assert!(editor.can_redo());
}

#[test]
fn typing_replaces_the_selection_as_one_step() {
    let mut editor = editor_with_text("hello world");
    editor.set_selection(Selection::new(
        Point::new(vec![0], 6),
        Point::new(vec![0], 11),
    ));

    editor.insert_text("there").unwrap();
    assert_eq!(editor.doc().children, vec![Node::paragraph("hello there")]);
    assert_eq!(editor.selection(), &Selection::collapsed(Point::new(vec![0], 11)));

    assert!(editor.undo());
    assert_eq!(editor.doc().children, vec![Node::paragraph("hello world")]);
    assert!(!editor.can_undo());
}

#[test]
fn new_batches_clear_redo() {
    let mut editor = editor_with_text("a");
    editor.insert_text("b").unwrap();
    assert!(editor.undo());
    assert!(editor.can_redo());

    editor.insert_text("c").unwrap();
    assert!(!editor.can_redo());
    assert_eq!(editor.doc().children, vec![Node::paragraph("ac")]);
}

#[test]
fn history_is_capped_by_config() {
    let config: EditorConfig =
        serde_json::from_value(serde_json::json!({ "max_undo": 2 })).unwrap();
    let mut editor = Editor::with_config(
        Document::new(vec![Node::paragraph("")]),
        Selection::collapsed(Point::new(vec![0], 0)),
        PluginRegistry::core(),
        config,
    );
    assert_eq!(editor.config().max_undo, 2);
    assert_eq!(editor.config().max_post_fix_passes, 10);

    for text in ["a", "b", "c"] {
        editor.insert_text(text).unwrap();
    }
    assert!(editor.undo());
    assert!(editor.undo());
    assert!(!editor.undo());
    assert_eq!(editor.doc().children, vec![Node::paragraph("a")]);
}
