use anyhow::{Result, anyhow};
use quick_xml::events::{BytesText, Event};
use quick_xml::name::ResolveResult;
use quick_xml::{NsReader, Writer};
use std::collections::BTreeMap;
use std::io::Cursor;
use tracing::debug;

use crate::error::ItemError;
use crate::price::clean_price;

pub const GOOGLE_NS: &[u8] = b"http://base.google.com/ns/1.0";

const ITEM_TAGS: [&[u8]; 2] = [b"item", b"entry"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    ImageLink,
    Price,
}

impl Field {
    fn from_local_name(name: &[u8]) -> Option<Self> {
        match name {
            b"title" => Some(Field::Title),
            b"image_link" => Some(Field::ImageLink),
            b"price" => Some(Field::Price),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductItem {
    pub index: usize,
    pub title: String,
    pub image_url: String,
    pub raw_price: Option<String>,
}

impl ProductItem {
    pub fn clean_price(&self) -> Option<String> {
        clean_price(self.raw_price.as_deref())
    }
}

#[derive(Debug, Clone)]
pub struct FeedEntry {
    pub index: usize,
    pub item: Result<ProductItem, ItemError>,
    link_namespaced: bool,
}

/// Parsed feed plus the original bytes, kept for rewriting.
#[derive(Debug, Clone)]
pub struct Feed {
    source: Vec<u8>,
    entries: Vec<FeedEntry>,
}

#[derive(Debug, Default)]
struct FieldSlot {
    namespaced: Option<String>,
    plain: Option<String>,
}

impl FieldSlot {
    fn store(&mut self, namespaced: bool, value: String) {
        let slot = if namespaced {
            &mut self.namespaced
        } else {
            &mut self.plain
        };
        if slot.is_none() {
            *slot = Some(value);
        }
    }

    /// Namespaced value first, then the plain one. Blank values count as absent.
    fn resolve(&self) -> Option<(&str, bool)> {
        fn pick(value: &Option<String>) -> Option<&str> {
            value
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
        }
        pick(&self.namespaced)
            .map(|value| (value, true))
            .or_else(|| pick(&self.plain).map(|value| (value, false)))
    }

    /// True when the element exists in either form, even if it is empty.
    fn is_present(&self) -> bool {
        self.namespaced.is_some() || self.plain.is_some()
    }
}

#[derive(Debug, Default)]
struct ItemFields {
    title: FieldSlot,
    image_link: FieldSlot,
    price: FieldSlot,
}

impl ItemFields {
    fn slot(&mut self, field: Field) -> &mut FieldSlot {
        match field {
            Field::Title => &mut self.title,
            Field::ImageLink => &mut self.image_link,
            Field::Price => &mut self.price,
        }
    }

    fn into_entry(self, index: usize) -> FeedEntry {
        let link = self.image_link.resolve();
        let link_namespaced = link.map(|(_, ns)| ns).unwrap_or(false);
        let item = match (self.title.resolve(), link) {
            (None, _) => Err(ItemError::FieldMissing { field: "title" }),
            (_, None) => Err(ItemError::FieldMissing {
                field: "image_link",
            }),
            _ if !self.price.is_present() => Err(ItemError::FieldMissing { field: "price" }),
            (Some((title, _)), Some((image_url, _))) => Ok(ProductItem {
                index,
                title: title.to_string(),
                image_url: image_url.to_string(),
                raw_price: self.price.resolve().map(|(price, _)| price.to_string()),
            }),
        };
        FeedEntry {
            index,
            item,
            link_namespaced,
        }
    }
}

fn is_google_ns(resolved: &ResolveResult) -> bool {
    matches!(resolved, ResolveResult::Bound(ns) if ns.0 == GOOGLE_NS)
}

impl Feed {
    pub fn parse(source: Vec<u8>) -> Result<Self> {
        let entries = parse_entries(&source)?;
        debug!("feed: parsed {} items", entries.len());
        Ok(Self { source, entries })
    }

    pub fn entries(&self) -> &[FeedEntry] {
        &self.entries
    }

    pub fn source(&self) -> &[u8] {
        &self.source
    }

    /// Copy of the feed where each listed item's image link text is replaced.
    /// Only the field the item was read from is touched; all other bytes pass through.
    pub fn rewrite_image_links(&self, links: &BTreeMap<usize, String>) -> Result<Vec<u8>> {
        let targets: BTreeMap<usize, (&str, bool)> = self
            .entries
            .iter()
            .filter(|entry| entry.item.is_ok())
            .filter_map(|entry| {
                links
                    .get(&entry.index)
                    .map(|link| (entry.index, (link.as_str(), entry.link_namespaced)))
            })
            .collect();

        let mut reader = NsReader::from_reader(Cursor::new(self.source.as_slice()));
        let mut writer = Writer::new(Vec::new());
        let mut buf = Vec::new();
        let mut depth = 0usize;
        let mut item_depth: Option<usize> = None;
        let mut item_index = 0usize;
        let mut target: Option<(&str, bool)> = None;
        let mut replacing: Option<usize> = None;
        let mut replaced = false;

        loop {
            let (resolved, event) = match reader.read_resolved_event_into(&mut buf) {
                Ok((resolved, event)) => (is_google_ns(&resolved), event),
                Err(err) => return Err(anyhow!("failed to parse feed xml: {}", err)),
            };
            match event {
                Event::Start(e) => {
                    depth += 1;
                    if replacing.is_none() {
                        let local = e.local_name();
                        match item_depth {
                            None if ITEM_TAGS.contains(&local.as_ref()) => {
                                item_depth = Some(depth);
                                target = targets.get(&item_index).copied();
                                replaced = false;
                            }
                            Some(d) if depth == d + 1 && !replaced => {
                                if let Some((_, namespaced)) = target {
                                    if local.as_ref() == b"image_link" && resolved == namespaced {
                                        replacing = Some(depth);
                                    }
                                }
                            }
                            _ => {}
                        }
                        writer.write_event(Event::Start(e.to_owned()))?;
                        if replacing == Some(depth) {
                            if let Some((link, _)) = target {
                                writer.write_event(Event::Text(BytesText::new(link)))?;
                            }
                        }
                    }
                }
                Event::End(e) => {
                    let nested_in_replacement = matches!(replacing, Some(d) if d != depth);
                    if replacing == Some(depth) {
                        replacing = None;
                        replaced = true;
                    }
                    if !nested_in_replacement {
                        if item_depth == Some(depth) {
                            item_depth = None;
                            item_index += 1;
                            target = None;
                        }
                        writer.write_event(Event::End(e.to_owned()))?;
                    }
                    depth = depth.saturating_sub(1);
                }
                Event::Empty(e) => {
                    if item_depth.is_none() && ITEM_TAGS.contains(&e.local_name().as_ref()) {
                        item_index += 1;
                    }
                    if replacing.is_none() {
                        writer.write_event(Event::Empty(e))?;
                    }
                }
                Event::Text(e) => {
                    if replacing.is_none() {
                        writer.write_event(Event::Text(e))?;
                    }
                }
                Event::CData(e) => {
                    if replacing.is_none() {
                        writer.write_event(Event::CData(e))?;
                    }
                }
                Event::Eof => break,
                other => {
                    writer.write_event(other)?;
                }
            }
            buf.clear();
        }
        Ok(writer.into_inner())
    }
}

fn parse_entries(xml: &[u8]) -> Result<Vec<FeedEntry>> {
    let mut reader = NsReader::from_reader(Cursor::new(xml));
    let mut buf = Vec::new();
    let mut entries = Vec::new();
    let mut depth = 0usize;
    let mut item_depth: Option<usize> = None;
    let mut fields = ItemFields::default();
    let mut current: Option<(Field, bool, usize)> = None;
    let mut text = String::new();

    loop {
        let (namespaced, event) = match reader.read_resolved_event_into(&mut buf) {
            Ok((resolved, event)) => (is_google_ns(&resolved), event),
            Err(err) => return Err(anyhow!("failed to parse feed xml: {}", err)),
        };
        match event {
            Event::Start(e) => {
                depth += 1;
                let local = e.local_name();
                match item_depth {
                    None if ITEM_TAGS.contains(&local.as_ref()) => {
                        item_depth = Some(depth);
                        fields = ItemFields::default();
                    }
                    Some(d) if depth == d + 1 && current.is_none() => {
                        if let Some(field) = Field::from_local_name(local.as_ref()) {
                            current = Some((field, namespaced, depth));
                            text.clear();
                        }
                    }
                    _ => {}
                }
            }
            Event::End(_) => {
                if let Some((field, ns, field_depth)) = current {
                    if field_depth == depth {
                        fields.slot(field).store(ns, std::mem::take(&mut text));
                        current = None;
                    }
                }
                if item_depth == Some(depth) {
                    let index = entries.len();
                    entries.push(std::mem::take(&mut fields).into_entry(index));
                    item_depth = None;
                }
                depth = depth.saturating_sub(1);
            }
            Event::Empty(e) => {
                let local = e.local_name();
                match item_depth {
                    None if ITEM_TAGS.contains(&local.as_ref()) => {
                        let index = entries.len();
                        entries.push(ItemFields::default().into_entry(index));
                    }
                    Some(d) if depth == d && current.is_none() => {
                        if let Some(field) = Field::from_local_name(local.as_ref()) {
                            fields.slot(field).store(namespaced, String::new());
                        }
                    }
                    _ => {}
                }
            }
            Event::Text(e) => {
                if current.is_some() {
                    text.push_str(&e.unescape()?);
                }
            }
            Event::CData(e) => {
                if current.is_some() {
                    let raw = e.into_inner();
                    text.push_str(&String::from_utf8_lossy(raw.as_ref()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    if item_depth.is_some() {
        return Err(anyhow!("failed to parse feed xml: unterminated item"));
    }
    Ok(entries)
}
