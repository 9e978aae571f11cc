use plate_core::{
    ChangeEvent, Conversion, DowncastGroup, ElementToAttribute, EventFilter, Priority, ViewElement,
    ViewMatcher, to_view_range,
};
use serde_json::Value;

use crate::decorators::LinkDecorators;
use crate::{HTML_CLASS, HTML_ID_ATTRIBUTE, LINK_ATTRIBUTE, LINK_CUSTOM_PROPERTY, LINK_PRIORITY};

/// The wrapper every link is rendered with, in both the editing and data
/// pipelines.
pub fn create_link_element(target: &str) -> ViewElement {
    ViewElement::attribute("a", LINK_PRIORITY)
        .with_class(HTML_CLASS)
        .with_attr(HTML_ID_ATTRIBUTE, target)
        .with_custom(LINK_CUSTOM_PROPERTY, true)
}

pub(crate) fn register(conversion: &mut Conversion, decorators: &LinkDecorators) {
    conversion.element_to_attribute(ElementToAttribute {
        view: ViewMatcher::element("a")
            .class(HTML_CLASS)
            .attribute(HTML_ID_ATTRIBUTE),
        key: LINK_ATTRIBUTE.to_string(),
        value: Box::new(|el| el.attr(HTML_ID_ATTRIBUTE).map(Value::from)),
    });
    conversion.attribute_to_element(
        DowncastGroup::Both,
        LINK_ATTRIBUTE,
        Priority::Normal,
        |value| value.as_str().map(create_link_element),
    );

    for decorator in decorators.automatic().iter().cloned() {
        let consumable = format!("attribute:{LINK_ATTRIBUTE}");
        conversion.downcast(
            DowncastGroup::Both,
            EventFilter::attribute(LINK_ATTRIBUTE),
            Priority::High,
            move |event, api| {
                let ChangeEvent::Attribute(change) = event else {
                    return;
                };
                // Only test: the link converter still has to consume it.
                if !api.consumable.test(&consumable) {
                    return;
                }
                let range = to_view_range(&change.range);
                let element = decorator.view_element();
                let target = change.new.as_ref().and_then(Value::as_str);
                if target.is_some() && decorator.applies_to(target) {
                    api.view.wrap(&range, element);
                } else {
                    api.view.unwrap(&range, &element);
                }
            },
        );
    }

    for decorator in decorators.manual() {
        let element = decorator.view_element();
        conversion.attribute_to_element(
            DowncastGroup::Both,
            decorator.id.as_str(),
            Priority::Normal,
            move |value| (value.as_bool() == Some(true)).then(|| element.clone()),
        );
        conversion.element_to_attribute(ElementToAttribute {
            view: decorator.matcher(),
            key: decorator.id.clone(),
            value: Box::new(|_| Some(Value::Bool(true))),
        });
    }
}
