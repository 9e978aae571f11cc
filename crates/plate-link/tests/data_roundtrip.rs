use plate_core::{Document, Editor, Node, PluginRegistry, Point, Selection, TextNode};
use plate_link::{LinkConfig, LinkEditing};

fn editor(doc: Document) -> Editor {
    let config = LinkConfig::default()
        .manual("openInNewTab", "Open in a new tab", false, [("target", "_blank")])
        .manual("downloadable", "Downloadable", false, [("download", "file")]);
    let link = LinkEditing::new(&config).unwrap();
    let registry = PluginRegistry::with_plugins([link.boxed()]).unwrap();
    Editor::new(doc, Selection::collapsed(Point::new(vec![0], 0)), registry)
}

fn two_links() -> Document {
    Document::new(vec![Node::paragraph_with(vec![
        TextNode::new("see "),
        TextNode::new("here")
            .with_attr("linkId", "T1")
            .with_attr("openInNewTab", true),
        TextNode::new(" and "),
        TextNode::new("there").with_attr("linkId", "T2"),
    ])])
}

const TWO_LINKS: &str = "<p>see <a class=\"internalLink\" data-elementid=\"T1\" target=\"_blank\">here</a> and <a class=\"internalLink\" data-elementid=\"T2\">there</a></p>";

#[test]
fn model_to_markup_and_back_is_lossless() -> anyhow::Result<()> {
    let editor = editor(two_links());

    let data = editor.get_data();
    assert_eq!(data, TWO_LINKS);
    assert_eq!(editor.parse_data(&data)?, two_links());
    Ok(())
}

#[test]
fn both_decorators_serialize_on_one_element() -> anyhow::Result<()> {
    let mut editor = editor(Document::default());
    editor.set_data(
        "<p><a class=\"internalLink\" data-elementid=\"T1\" download=\"file\" target=\"_blank\">x</a></p>",
    )?;

    assert_eq!(
        editor.doc().children,
        vec![Node::paragraph_with(vec![TextNode::new("x")
            .with_attr("downloadable", true)
            .with_attr("linkId", "T1")
            .with_attr("openInNewTab", true)])]
    );
    assert_eq!(
        editor.get_data(),
        "<p><a class=\"internalLink\" data-elementid=\"T1\" download=\"file\" target=\"_blank\">x</a></p>"
    );
    Ok(())
}

#[test]
fn decorator_attributes_must_match_exactly() -> anyhow::Result<()> {
    let editor = editor(Document::default());
    let doc = editor.parse_data(
        "<p><a class=\"internalLink\" data-elementid=\"T1\" target=\"_self\">x</a></p>",
    )?;
    assert_eq!(
        doc.children,
        vec![Node::paragraph_with(vec![
            TextNode::new("x").with_attr("linkId", "T1")
        ])]
    );
    Ok(())
}

#[test]
fn anchors_without_the_link_class_are_plain_text() -> anyhow::Result<()> {
    let editor = editor(Document::default());
    let doc = editor.parse_data("<p><a data-elementid=\"T1\">x</a> <a class=\"internalLink\">y</a></p>")?;
    assert_eq!(doc.children, vec![Node::paragraph("x y")]);
    Ok(())
}

#[test]
fn nested_links_take_the_inner_target() -> anyhow::Result<()> {
    let editor = editor(Document::default());
    let doc = editor.parse_data(
        "<p><a class=\"internalLink\" data-elementid=\"T1\">a<a class=\"internalLink\" data-elementid=\"T2\">b</a></a></p>",
    )?;
    assert_eq!(
        doc.children,
        vec![Node::paragraph_with(vec![
            TextNode::new("a").with_attr("linkId", "T1"),
            TextNode::new("b").with_attr("linkId", "T2"),
        ])]
    );
    Ok(())
}

#[test]
fn adjacent_links_with_different_targets_stay_apart() {
    let editor = editor(Document::new(vec![Node::paragraph_with(vec![
        TextNode::new("ab").with_attr("linkId", "T1"),
        TextNode::new("cd").with_attr("linkId", "T2"),
    ])]));
    assert_eq!(
        editor.get_data(),
        "<p><a class=\"internalLink\" data-elementid=\"T1\">ab</a><a class=\"internalLink\" data-elementid=\"T2\">cd</a></p>"
    );
}
