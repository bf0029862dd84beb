//! 文档重写器
//!
//! 把页面加载结束时的 HTML 转换为只引用捕获结果的离线文档。重写分两步：
//!
//! 1. [`collect_stylesheets`] 找出文档需要的外链样式表和内联样式，
//!    交给 [`StylesheetBundle`](crate::parsers::stylesheets::StylesheetBundle) 异步取回
//! 2. [`DocumentRewriter::rewrite`] 同步遍历 DOM，按元素类型调用处理器
//!
//! 无法解析为本地路径的引用一律导致元素被移除，输出中不会留下指向网络的引用。
//! 任何一张样式表无法获取时整个重写失败。

use html5ever::tree_builder::{NodeOrText, TreeSink};
use markup5ever_rcdom::{Handle, NodeData, RcDom};

use crate::builders::shim::SHIM_SCRIPT_ID;
use crate::error::{DumpError, DumpResult};
use crate::parsers::css::CssRewriter;
use crate::parsers::references::{LocalReference, ReferenceMapper};
use crate::utils::url::{resolve_url, Url};

use super::dom::{
    create_html_element, find_nodes, get_node_attr, get_node_name, get_text_content,
    html_to_dom, replace_node, serialize_children, set_node_attr, set_text_content,
};
use super::parser::{first_srcset_candidate, is_stylesheet};

/// 追加在标题后的快照标记
pub const TITLE_MARKER: &str = " (Captured by pagedump)";

/// 页面没有标题时使用的标题
pub const DEFAULT_TITLE: &str = "Page";

const MEDIA_ELEMENTS: &[&str] = &["img", "audio", "video", "input", "track", "image", "source"];

const REMOVED_ELEMENTS: &[&str] = &["base", "meta", "embed", "object", "frame", "iframe"];

/// 文档重写需要的样式表
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StylesheetDemand {
    /// `link[rel=stylesheet]` 指向的样式表
    pub linked: Vec<Url>,
    /// 非空 `style` 元素的内容及其基准 URL
    pub inline: Vec<(String, Url)>,
}

/// 找出文档中会被内联的全部样式表
///
/// 会被整体移除的元素（iframe、object 等）内部的样式不计入。
pub fn collect_stylesheets(html: &str, base: &Url) -> StylesheetDemand {
    let dom = html_to_dom(html);
    let mut demand = StylesheetDemand::default();
    collect_from(&dom.document, base, &mut demand);
    demand
}

fn collect_from(node: &Handle, base: &Url, demand: &mut StylesheetDemand) {
    if let Some(name) = get_node_name(node) {
        if REMOVED_ELEMENTS.contains(&name) {
            return;
        }

        match name {
            "link" => {
                let rel = get_node_attr(node, "rel").unwrap_or_default();
                let href = get_node_attr(node, "href").unwrap_or_default();
                if is_stylesheet(&rel) && !href.trim().is_empty() {
                    if let Some(url) = resolve_url(base, &href) {
                        demand.linked.push(url);
                    }
                }
            }
            "style" => {
                let css = get_text_content(node);
                if !css.trim().is_empty() {
                    demand.inline.push((css, base.clone()));
                }
            }
            _ => {}
        }
    }

    for child in node.children.borrow().iter() {
        collect_from(child, base, demand);
    }
}

/// 重写后的文档内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewrittenDocument {
    pub title: String,
    /// `<head>` 的内部 HTML
    pub head: String,
    /// `<body>` 的内部 HTML
    pub body: String,
}

/// 处理器对元素的处置
#[derive(Debug)]
pub enum ElementAction {
    Keep,
    Remove,
    Replace(Handle),
}

/// 处理器共享的重写上下文
pub struct RewriteContext<'a> {
    pub dom: &'a RcDom,
    pub base: &'a Url,
    pub references: &'a ReferenceMapper<'a>,
    pub css: &'a CssRewriter<'a>,
}

/// HTML 元素处理器特征
pub trait ElementHandler {
    /// 检查是否能处理指定的元素名称
    fn can_handle(&self, element_name: &str) -> bool;

    /// 处理元素，返回元素的去留
    ///
    /// # 错误
    ///
    /// 样式表无法获取时返回 `StylesheetFetch`，整个重写随之失败
    fn handle(&self, ctx: &RewriteContext<'_>, node: &Handle) -> DumpResult<ElementAction>;
}

/// 媒体元素处理器
///
/// 取 `src`，SVG `image` 取 `href`（含 `xlink:href`），都没有时取 `srcset` 的第一个候选；
/// 能解析为本地路径时写回原属性并去掉 `srcset`，否则移除元素。没有任何引用的元素保持不变。
pub struct MediaElementHandler;

impl MediaElementHandler {
    fn reference(node: &Handle) -> Option<(&'static str, String)> {
        let present = |name: &str| get_node_attr(node, name).filter(|value| !value.trim().is_empty());

        if let Some(src) = present("src") {
            return Some(("src", src));
        }
        if get_node_name(node) == Some("image") {
            if let Some(href) = present("href") {
                return Some(("href", href));
            }
        }

        let srcset = get_node_attr(node, "srcset").unwrap_or_default();
        first_srcset_candidate(&srcset).map(|candidate| ("src", candidate.to_string()))
    }
}

impl ElementHandler for MediaElementHandler {
    fn can_handle(&self, element_name: &str) -> bool {
        MEDIA_ELEMENTS.contains(&element_name)
    }

    fn handle(&self, ctx: &RewriteContext<'_>, node: &Handle) -> DumpResult<ElementAction> {
        let Some((attr, reference)) = Self::reference(node) else {
            return Ok(ElementAction::Keep);
        };

        let value = match ctx.references.map(&reference, ctx.base) {
            LocalReference::Keep => reference.trim().to_string(),
            LocalReference::Local(path) => path,
            LocalReference::Missing => return Ok(ElementAction::Remove),
        };

        set_node_attr(node, attr, Some(value));
        set_node_attr(node, "srcset", None);
        Ok(ElementAction::Keep)
    }
}

/// 无条件移除的元素：base、meta，以及不做递归捕获的嵌套浏览上下文
pub struct RemovedElementHandler;

impl ElementHandler for RemovedElementHandler {
    fn can_handle(&self, element_name: &str) -> bool {
        REMOVED_ELEMENTS.contains(&element_name)
    }

    fn handle(&self, _ctx: &RewriteContext<'_>, _node: &Handle) -> DumpResult<ElementAction> {
        Ok(ElementAction::Remove)
    }
}

/// LINK 元素处理器
///
/// 样式表链接被替换为内容等价的 `style` 元素，其余链接一律移除。
pub struct LinkElementHandler;

impl ElementHandler for LinkElementHandler {
    fn can_handle(&self, element_name: &str) -> bool {
        element_name == "link"
    }

    fn handle(&self, ctx: &RewriteContext<'_>, node: &Handle) -> DumpResult<ElementAction> {
        let rel = get_node_attr(node, "rel").unwrap_or_default();
        let href = get_node_attr(node, "href").unwrap_or_default();

        if !is_stylesheet(&rel) || href.trim().is_empty() {
            return Ok(ElementAction::Remove);
        }

        let url = resolve_url(ctx.base, &href)
            .ok_or_else(|| DumpError::stylesheet(href.as_str(), "unresolvable stylesheet link"))?;
        let css = ctx.css.rewrite_linked(&url)?;
        if css.trim().is_empty() {
            return Ok(ElementAction::Remove);
        }

        let media = get_node_attr(node, "media").filter(|media| !media.trim().is_empty());
        let mut attrs = vec![("type", "text/css")];
        if let Some(media) = media.as_deref() {
            attrs.push(("media", media));
        }

        let style = create_html_element(ctx.dom, "style", &attrs);
        set_text_content(ctx.dom, &style, &css);
        Ok(ElementAction::Replace(style))
    }
}

/// STYLE 元素处理器
pub struct StyleElementHandler;

impl ElementHandler for StyleElementHandler {
    fn can_handle(&self, element_name: &str) -> bool {
        element_name == "style"
    }

    fn handle(&self, ctx: &RewriteContext<'_>, node: &Handle) -> DumpResult<ElementAction> {
        let css = get_text_content(node);
        if css.trim().is_empty() {
            return Ok(ElementAction::Remove);
        }

        let css = ctx.css.rewrite_stylesheet(&css, ctx.base)?;
        if css.trim().is_empty() {
            return Ok(ElementAction::Remove);
        }

        set_text_content(ctx.dom, node, &css);
        Ok(ElementAction::Keep)
    }
}

/// SCRIPT 元素处理器
///
/// 外链脚本按媒体元素的规则映射 `src`；内联脚本不做分析，原样保留。
/// 之前注入的运行时脚本会被移除，由文档外壳重新注入。
pub struct ScriptElementHandler;

impl ElementHandler for ScriptElementHandler {
    fn can_handle(&self, element_name: &str) -> bool {
        element_name == "script"
    }

    fn handle(&self, ctx: &RewriteContext<'_>, node: &Handle) -> DumpResult<ElementAction> {
        if get_node_attr(node, "id").as_deref() == Some(SHIM_SCRIPT_ID) {
            return Ok(ElementAction::Remove);
        }

        let Some(src) = get_node_attr(node, "src").filter(|src| !src.trim().is_empty()) else {
            return Ok(ElementAction::Keep);
        };

        match ctx.references.map(&src, ctx.base) {
            LocalReference::Keep => Ok(ElementAction::Keep),
            LocalReference::Local(path) => {
                set_node_attr(node, "src", Some(path));
                Ok(ElementAction::Keep)
            }
            LocalReference::Missing => Ok(ElementAction::Remove),
        }
    }
}

/// 元素处理器注册表
pub struct ElementHandlerRegistry {
    handlers: Vec<Box<dyn ElementHandler>>,
}

impl Default for ElementHandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ElementHandlerRegistry {
    pub fn new() -> Self {
        let mut registry = ElementHandlerRegistry {
            handlers: Vec::new(),
        };

        registry.register(Box::new(MediaElementHandler));
        registry.register(Box::new(RemovedElementHandler));
        registry.register(Box::new(LinkElementHandler));
        registry.register(Box::new(StyleElementHandler));
        registry.register(Box::new(ScriptElementHandler));

        registry
    }

    /// 注册新的元素处理器，先注册的优先
    pub fn register(&mut self, handler: Box<dyn ElementHandler>) {
        self.handlers.push(handler);
    }

    /// 用第一个能处理该元素的处理器处理元素，没有处理器时保留元素
    pub fn handle_element(
        &self,
        element_name: &str,
        ctx: &RewriteContext<'_>,
        node: &Handle,
    ) -> DumpResult<ElementAction> {
        match self
            .handlers
            .iter()
            .find(|handler| handler.can_handle(element_name))
        {
            Some(handler) => handler.handle(ctx, node),
            None => Ok(ElementAction::Keep),
        }
    }
}

/// 文档重写器
pub struct DocumentRewriter<'a> {
    registry: ElementHandlerRegistry,
    references: &'a ReferenceMapper<'a>,
    css: &'a CssRewriter<'a>,
    base: &'a Url,
}

impl<'a> DocumentRewriter<'a> {
    pub fn new(references: &'a ReferenceMapper<'a>, css: &'a CssRewriter<'a>, base: &'a Url) -> Self {
        Self {
            registry: ElementHandlerRegistry::new(),
            references,
            css,
            base,
        }
    }

    /// 重写 `html`，返回标题与 head、body 的内部 HTML
    ///
    /// 对重写结果（经文档外壳包装后）再次重写不会产生任何变化。
    pub fn rewrite(&self, html: &str) -> DumpResult<RewrittenDocument> {
        let dom = html_to_dom(html);
        let ctx = RewriteContext {
            dom: &dom,
            base: self.base,
            references: self.references,
            css: self.css,
        };

        self.walk(&ctx, &dom.document)?;
        let title = apply_title(&dom);

        let head = find_nodes(&dom.document, &["html", "head"]).into_iter().next();
        let body = find_nodes(&dom.document, &["html", "body"]).into_iter().next();

        Ok(RewrittenDocument {
            title,
            head: inner_html(head.as_ref())?,
            body: inner_html(body.as_ref())?,
        })
    }

    fn walk(&self, ctx: &RewriteContext<'_>, node: &Handle) -> DumpResult<()> {
        let children: Vec<Handle> = node.children.borrow().clone();

        for child in children {
            let NodeData::Element { ref name, .. } = child.data else {
                continue;
            };

            match self.registry.handle_element(name.local.as_ref(), ctx, &child)? {
                ElementAction::Remove => {
                    ctx.dom.remove_from_parent(&child);
                    continue;
                }
                ElementAction::Replace(replacement) => {
                    replace_node(ctx.dom, &child, replacement);
                    continue;
                }
                ElementAction::Keep => {}
            }

            self.rewrite_style_attribute(ctx, &child)?;
            self.walk(ctx, &child)?;
        }

        Ok(())
    }

    fn rewrite_style_attribute(&self, ctx: &RewriteContext<'_>, node: &Handle) -> DumpResult<()> {
        if let Some(style) = get_node_attr(node, "style").filter(|style| !style.trim().is_empty()) {
            let style = ctx.css.rewrite_declaration_block(&style, ctx.base)?;
            set_node_attr(node, "style", Some(style));
        }
        Ok(())
    }
}

/// 标题加上快照标记（已带标记时不重复追加）
pub fn marked_title(title: &str) -> String {
    let title = title.trim();
    if title.is_empty() {
        format!("{}{}", DEFAULT_TITLE, TITLE_MARKER)
    } else if title.ends_with(TITLE_MARKER) {
        title.to_string()
    } else {
        format!("{}{}", title, TITLE_MARKER)
    }
}

fn apply_title(dom: &RcDom) -> String {
    if let Some(title_node) = find_nodes(&dom.document, &["title"]).into_iter().next() {
        let title = marked_title(&get_text_content(&title_node));
        set_text_content(dom, &title_node, &title);
        return title;
    }

    let title = marked_title("");
    if let Some(head) = find_nodes(&dom.document, &["html", "head"]).into_iter().next() {
        let title_node = create_html_element(dom, "title", &[]);
        set_text_content(dom, &title_node, &title);
        dom.append(&head, NodeOrText::AppendNode(title_node));
    }
    title
}

fn inner_html(node: Option<&Handle>) -> DumpResult<String> {
    match node {
        Some(node) => Ok(serialize_children(node)?.trim().to_string()),
        None => Ok(String::new()),
    }
}
