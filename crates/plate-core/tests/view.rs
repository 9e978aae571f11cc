use std::cell::RefCell;
use std::rc::Rc;

use plate_core::{
    Document, DowncastGroup, EditorSetup, Editor, EventFilter, Node, PlatePlugin, PluginRegistry,
    Point, Priority, Selection, ViewElement,
};

/// Records the order its listeners see each pass in.
struct TracePlugin {
    trace: Rc<RefCell<Vec<&'static str>>>,
}

impl PlatePlugin for TracePlugin {
    fn id(&self) -> &'static str {
        "test.trace"
    }

    fn setup(&self, setup: &mut EditorSetup<'_>) {
        for (label, priority) in [
            ("selection:low", Priority::Low),
            ("selection:highest", Priority::Highest),
        ] {
            let trace = self.trace.clone();
            setup.conversion.downcast(
                DowncastGroup::Editing,
                EventFilter::Selection,
                priority,
                move |_, _| trace.borrow_mut().push(label),
            );
        }
        let trace = self.trace.clone();
        setup.conversion.downcast(
            DowncastGroup::Editing,
            EventFilter::Insert,
            Priority::Normal,
            move |_, _| trace.borrow_mut().push("insert"),
        );
        let trace = self.trace.clone();
        setup.editing.register_post_fixer(move |_, _| {
            trace.borrow_mut().push("post-fix");
            false
        });
    }
}

fn traced_editor(text: &str) -> (Editor, Rc<RefCell<Vec<&'static str>>>) {
    let trace = Rc::new(RefCell::new(Vec::new()));
    let plugin = TracePlugin {
        trace: trace.clone(),
    };
    let registry =
        PluginRegistry::with_plugins([Box::new(plugin) as Box<dyn PlatePlugin>]).unwrap();
    let doc = Document::new(vec![Node::paragraph(text)]);
    let editor = Editor::new(doc, Selection::collapsed(Point::new(vec![0], text.len())), registry);
    (editor, trace)
}

#[test]
fn selection_event_closes_every_pass_before_post_fixers() {
    let (mut editor, trace) = traced_editor("hello");
    trace.borrow_mut().clear();

    editor.insert_text("!").unwrap();
    assert_eq!(
        *trace.borrow(),
        vec!["insert", "selection:highest", "selection:low", "post-fix"]
    );

    trace.borrow_mut().clear();
    editor.set_selection(Selection::collapsed(Point::new(vec![0], 0)));
    assert_eq!(
        *trace.borrow(),
        vec!["selection:highest", "selection:low", "post-fix"]
    );
}

#[test]
fn data_pipeline_skips_editing_listeners() {
    let (editor, trace) = traced_editor("hello");
    trace.borrow_mut().clear();

    assert_eq!(editor.get_data(), "<p>hello</p>");
    assert!(trace.borrow().is_empty());
}

#[test]
fn ui_elements_survive_later_typing() {
    let (mut editor, _) = traced_editor("hello");
    editor.change_view(|view| {
        view.insert_ui(&[0], 0, ViewElement::ui("span"));
    });
    assert_eq!(editor.editing_view().to_markup(), "<p><span></span>hello</p>");

    editor.insert_text("X").unwrap();
    assert_eq!(editor.editing_view().to_markup(), "<p><span></span>helloX</p>");
    assert_eq!(editor.get_data(), "<p>helloX</p>");
}

#[test]
fn post_fixers_run_until_nothing_changes() {
    let calls = Rc::new(RefCell::new(0usize));

    struct MarkPlugin {
        calls: Rc<RefCell<usize>>,
    }

    impl PlatePlugin for MarkPlugin {
        fn id(&self) -> &'static str {
            "test.mark"
        }

        fn setup(&self, setup: &mut EditorSetup<'_>) {
            let calls = self.calls.clone();
            setup.editing.register_post_fixer(move |view, _| {
                *calls.borrow_mut() += 1;
                let Some(id) = view.elements().first().map(|el| el.id()) else {
                    return false;
                };
                view.add_class(id, "marked")
            });
        }
    }

    let registry = PluginRegistry::with_plugins([Box::new(MarkPlugin {
        calls: calls.clone(),
    }) as Box<dyn PlatePlugin>])
    .unwrap();
    let editor = Editor::new(
        Document::new(vec![Node::paragraph("x")]),
        Selection::collapsed(Point::new(vec![0], 0)),
        registry,
    );

    assert_eq!(editor.editing_view().to_markup(), "<p class=\"marked\">x</p>");
    assert_eq!(*calls.borrow(), 2);
    assert_eq!(editor.get_data(), "<p>x</p>");
}
