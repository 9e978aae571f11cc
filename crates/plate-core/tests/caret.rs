use plate_core::{
    CaretDirection, Document, EditorSetup, Editor, Node, PlatePlugin, PluginRegistry, Point,
    Selection, TextNode,
};
use serde_json::json;

struct CodePlugin;

impl PlatePlugin for CodePlugin {
    fn id(&self) -> &'static str {
        "test.code"
    }

    fn text_attributes(&self) -> Vec<String> {
        vec!["code".to_string()]
    }

    fn setup(&self, setup: &mut EditorSetup<'_>) {
        setup.caret.register_attribute("code");
    }
}

/// `ab[cd]ef` with the caret at `offset`.
fn editor_at(offset: usize) -> Editor {
    let doc = Document::new(vec![Node::paragraph_with(vec![
        TextNode::new("ab"),
        TextNode::new("cd").with_attr("code", true),
        TextNode::new("ef"),
    ])]);
    let registry =
        PluginRegistry::with_plugins([Box::new(CodePlugin) as Box<dyn PlatePlugin>]).unwrap();
    Editor::new(doc, Selection::collapsed(Point::new(vec![0], offset)), registry)
}

fn offset(editor: &Editor) -> usize {
    editor.selection().focus.offset
}

#[test]
fn forward_step_at_the_end_only_changes_gravity() {
    let mut editor = editor_at(4);
    assert_eq!(editor.selection_attributes().get("code"), Some(&json!(true)));

    assert!(editor.move_caret(CaretDirection::Forward));
    assert_eq!(offset(&editor), 4);
    assert!(editor.is_gravity_overridden());
    assert!(editor.selection_attributes().is_empty());

    assert!(editor.move_caret(CaretDirection::Forward));
    assert_eq!(offset(&editor), 5);
    assert!(!editor.is_gravity_overridden());
}

#[test]
fn forward_step_at_the_start_enters_before_moving() {
    let mut editor = editor_at(2);
    assert!(editor.selection_attributes().is_empty());

    assert!(editor.move_caret(CaretDirection::Forward));
    assert_eq!(offset(&editor), 2);
    assert_eq!(editor.selection_attributes().get("code"), Some(&json!(true)));

    editor.insert_text("X").unwrap();
    assert_eq!(
        editor.doc().children,
        vec![Node::paragraph_with(vec![
            TextNode::new("ab"),
            TextNode::new("Xcd").with_attr("code", true),
            TextNode::new("ef"),
        ])]
    );
}

#[test]
fn backward_steps_keep_the_side_the_caret_came_from() {
    let mut editor = editor_at(5);

    assert!(editor.move_caret(CaretDirection::Backward));
    assert_eq!(offset(&editor), 4);
    assert!(editor.is_gravity_overridden());
    assert!(editor.selection_attributes().is_empty());

    assert!(editor.move_caret(CaretDirection::Backward));
    assert_eq!(offset(&editor), 4);
    assert!(!editor.is_gravity_overridden());
    assert_eq!(editor.selection_attributes().get("code"), Some(&json!(true)));
}

#[test]
fn explicit_selection_restores_default_gravity() {
    let mut editor = editor_at(4);
    editor.move_caret(CaretDirection::Forward);
    assert!(editor.is_gravity_overridden());

    editor.set_selection(Selection::collapsed(Point::new(vec![0], 4)));
    assert!(!editor.is_gravity_overridden());
}

#[test]
fn caret_stops_at_the_document_edges() {
    let mut editor = editor_at(0);
    assert!(!editor.move_caret(CaretDirection::Backward));

    editor.set_selection(Selection::collapsed(Point::new(vec![0], 6)));
    assert!(!editor.move_caret(CaretDirection::Forward));
}
