use std::cell::RefCell;

use html5ever::interface::{Attribute, QualName};
use html5ever::parse_document;
use html5ever::serialize::{serialize, SerializeOpts, TraversalScope};
use html5ever::tendril::{format_tendril, StrTendril, TendrilSink};
use html5ever::tree_builder::{create_element, NodeOrText, TreeSink};
use html5ever::{namespace_url, ns, LocalName};
use markup5ever_rcdom::{Handle, Node, NodeData, RcDom, SerializableHandle};

use crate::error::DumpResult;

/// 将 HTML 文本解析为 DOM
pub fn html_to_dom(html: &str) -> RcDom {
    parse_document(RcDom::default(), Default::default()).one(html)
}

/// 查找指定路径的DOM节点
pub fn find_nodes(node: &Handle, node_names: &[&str]) -> Vec<Handle> {
    let Some((&node_name, rest)) = node_names.split_first() else {
        return Vec::new();
    };

    let mut found_nodes = Vec::new();
    let matches = get_node_name(node) == Some(node_name);

    if matches && rest.is_empty() {
        found_nodes.push(node.clone());
    }

    let next_names = if matches && !rest.is_empty() {
        rest
    } else {
        node_names
    };
    for child_node in node.children.borrow().iter() {
        found_nodes.append(&mut find_nodes(child_node, next_names));
    }

    found_nodes
}

/// 根据名称获取子节点
pub fn get_child_node_by_name(parent: &Handle, node_name: &str) -> Option<Handle> {
    parent
        .children
        .borrow()
        .iter()
        .find(|child| get_node_name(child) == Some(node_name))
        .cloned()
}

/// 获取节点属性值
pub fn get_node_attr(node: &Handle, attr_name: &str) -> Option<String> {
    match &node.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .find(|attr| &*attr.name.local == attr_name)
            .map(|attr| attr.value.to_string()),
        _ => None,
    }
}

/// 获取节点名称
pub fn get_node_name(node: &Handle) -> Option<&'_ str> {
    match &node.data {
        NodeData::Element { name, .. } => Some(name.local.as_ref()),
        _ => None,
    }
}

/// 设置节点属性，`None` 表示移除
pub fn set_node_attr(node: &Handle, attr_name: &str, attr_value: Option<String>) {
    if let NodeData::Element { attrs, .. } = &node.data {
        let attrs_mut = &mut attrs.borrow_mut();

        match attr_value {
            None => attrs_mut.retain(|attr| &*attr.name.local != attr_name),
            Some(attr_value) => {
                if let Some(attr) = attrs_mut
                    .iter_mut()
                    .find(|attr| &*attr.name.local == attr_name)
                {
                    attr.value = StrTendril::from(attr_value);
                } else {
                    attrs_mut.push(Attribute {
                        name: QualName::new(None, ns!(), LocalName::from(attr_name)),
                        value: format_tendril!("{}", attr_value),
                    });
                }
            }
        }
    }
}

/// 节点下所有文本节点内容的拼接
pub fn get_text_content(node: &Handle) -> String {
    let mut text = String::new();
    collect_text(node, &mut text);
    text
}

fn collect_text(node: &Handle, text: &mut String) {
    if let NodeData::Text { contents } = &node.data {
        text.push_str(&contents.borrow());
    }
    for child in node.children.borrow().iter() {
        collect_text(child, text);
    }
}

/// 用单个文本节点替换节点的全部子节点
pub fn set_text_content(dom: &RcDom, node: &Handle, text: &str) {
    let children: Vec<Handle> = node.children.borrow().clone();
    for child in children {
        dom.remove_from_parent(&child);
    }

    let text_node = Node::new(NodeData::Text {
        contents: RefCell::new(StrTendril::from(text)),
    });
    dom.append(node, NodeOrText::AppendNode(text_node));
}

/// 创建一个带属性的 HTML 元素
pub fn create_html_element(dom: &RcDom, name: &str, attrs: &[(&str, &str)]) -> Handle {
    create_element(
        dom,
        QualName::new(None, ns!(html), LocalName::from(name)),
        attrs
            .iter()
            .map(|(name, value)| Attribute {
                name: QualName::new(None, ns!(), LocalName::from(*name)),
                value: format_tendril!("{}", value),
            })
            .collect(),
    )
}

/// 把 `replacement` 放到 `node` 的位置，并移除 `node`
pub fn replace_node(dom: &RcDom, node: &Handle, replacement: Handle) {
    dom.append_before_sibling(node, NodeOrText::AppendNode(replacement));
    dom.remove_from_parent(node);
}

/// 序列化节点的子节点（相当于 innerHTML）
pub fn serialize_children(node: &Handle) -> DumpResult<String> {
    let mut buf: Vec<u8> = Vec::new();
    let serializable: SerializableHandle = node.clone().into();
    serialize(
        &mut buf,
        &serializable,
        SerializeOpts {
            traversal_scope: TraversalScope::ChildrenOnly(None),
            ..Default::default()
        },
    )?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
