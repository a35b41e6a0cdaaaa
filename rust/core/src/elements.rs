// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Element index
//!
//! Everything the viewer needs to know about a model besides its geometry:
//! the stable GlobalId of each rooted element, its display attributes, the
//! property sets attached through `IFCRELDEFINESBYPROPERTIES`, and the spatial
//! breakdown from `IFCRELAGGREGATES` / `IFCRELCONTAINEDINSPATIALSTRUCTURE`.

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::error::{Error, Result};
use crate::parser::{parse_entity, Token};
use crate::scanner::{file_schema, locate_data_section, EntityScanner};

type RefList = SmallVec<[u32; 4]>;

/// Check whether text is a compressed IFC GlobalId (22 chars of the IFC base64 alphabet).
pub fn is_ifc_guid(text: &str) -> bool {
    text.len() == 22
        && text
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'$')
}

/// A rooted IFC element.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ElementRecord {
    /// Express id (`#id`), local to one file.
    pub id: u32,
    /// Upper-case entity type, e.g. `IFCWALL`.
    pub ifc_type: String,
    pub guid: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub object_type: Option<String>,
}

/// A single named property value.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Property {
    pub name: String,
    pub value: Option<String>,
}

/// A resolved property set.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PropertySet {
    pub name: String,
    pub properties: Vec<Property>,
}

/// Index over the elements of one decoded file.
#[derive(Debug, Default, Clone)]
pub struct ElementIndex {
    schema: Option<String>,
    order: Vec<u32>,
    elements: FxHashMap<u32, ElementRecord>,
    by_guid: FxHashMap<String, u32>,
    property_sets: FxHashMap<u32, PropertySet>,
    element_psets: FxHashMap<u32, RefList>,
    children: FxHashMap<u32, RefList>,
    parents: FxHashMap<u32, u32>,
}

/// Relationship entities collected during the scan; resolved afterwards since
/// STEP files reference forward as often as backward.
#[derive(Default)]
struct PendingRelations {
    single_values: FxHashMap<u32, Property>,
    pset_members: Vec<(u32, String, RefList)>,
    defines: Vec<(RefList, u32)>,
    decomposition: Vec<(u32, RefList)>,
}

fn is_element_type(type_name: &str) -> bool {
    !(type_name.starts_with("IFCREL")
        || type_name == "IFCPROPERTYSET"
        || type_name == "IFCELEMENTQUANTITY")
}

fn text_at(attrs: &[Token], index: usize) -> Option<String> {
    attrs.get(index).and_then(Token::as_text).filter(|s| !s.is_empty())
}

/// Incremental [`ElementIndex`] construction.
///
/// [`step`](Self::step) scans a bounded number of instances so callers on a
/// UI thread can yield between batches. Relationships are resolved in
/// [`finish`](Self::finish).
pub struct ElementIndexBuilder<'a> {
    data: &'a str,
    data_start: usize,
    scanner: EntityScanner<'a>,
    seen: FxHashSet<u32>,
    pending: PendingRelations,
    index: ElementIndex,
    scanned: usize,
}

impl<'a> ElementIndexBuilder<'a> {
    pub fn new(bytes: &'a [u8]) -> Result<Self> {
        let content =
            std::str::from_utf8(bytes).map_err(|e| Error::InvalidUtf8(e.valid_up_to()))?;
        Self::from_content(content)
    }

    /// Validate the header and locate the DATA section. No instance is read yet.
    pub fn from_content(content: &'a str) -> Result<Self> {
        let (data_start, data_end) = locate_data_section(content)?;
        let data = &content[data_start..data_end];
        Ok(Self {
            data,
            data_start,
            scanner: EntityScanner::new(data),
            seen: FxHashSet::default(),
            pending: PendingRelations::default(),
            index: ElementIndex {
                schema: file_schema(&content[..data_start]),
                ..Default::default()
            },
            scanned: 0,
        })
    }

    /// Scan up to `batch` instances. Returns `true` once the DATA section is exhausted.
    pub fn step(&mut self, batch: usize) -> Result<bool> {
        for _ in 0..batch.max(1) {
            let Some((id, _, start, end)) = self.scanner.next_entity()? else {
                return Ok(true);
            };
            if !self.seen.insert(id) {
                return Err(Error::DuplicateEntity(id));
            }
            let data_start = self.data_start;
            let (_, type_name, attrs) = parse_entity(&self.data[start..end]).map_err(|e| match e {
                Error::Parse { position, message } => Error::parse(data_start + start + position, message),
                other => other,
            })?;
            self.index.collect(id, type_name, &attrs, &mut self.pending);
            self.scanned += 1;
        }
        Ok(false)
    }

    /// Instances scanned so far.
    pub fn scanned(&self) -> usize {
        self.scanned
    }

    /// Scan whatever is left and resolve relationships.
    pub fn finish(mut self) -> Result<ElementIndex> {
        while !self.step(usize::MAX)? {}
        let mut index = self.index;
        index.resolve(self.pending);
        Ok(index)
    }
}

impl ElementIndex {
    /// Decode raw file bytes.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        ElementIndexBuilder::new(bytes)?.finish()
    }

    /// Decode file text.
    pub fn from_content(content: &str) -> Result<Self> {
        ElementIndexBuilder::from_content(content)?.finish()
    }

    fn collect(&mut self, id: u32, type_name: &str, attrs: &[Token], pending: &mut PendingRelations) {
        let type_name = type_name.to_ascii_uppercase();
        match type_name.as_str() {
            "IFCPROPERTYSINGLEVALUE" => {
                if let Some(name) = text_at(attrs, 0) {
                    let value = attrs.get(2).and_then(Token::display_value);
                    pending.single_values.insert(id, Property { name, value });
                }
            }
            "IFCPROPERTYSET" => {
                let name = text_at(attrs, 2).unwrap_or_default();
                let members: RefList = attrs.get(4).map(|t| t.ref_list().into()).unwrap_or_default();
                pending.pset_members.push((id, name, members));
            }
            "IFCRELDEFINESBYPROPERTIES" => {
                if let Some(pset) = attrs.get(5).and_then(Token::as_ref_id) {
                    let objects: RefList = attrs.get(4).map(|t| t.ref_list().into()).unwrap_or_default();
                    pending.defines.push((objects, pset));
                }
            }
            "IFCRELAGGREGATES" => {
                if let Some(parent) = attrs.get(4).and_then(Token::as_ref_id) {
                    let related: RefList = attrs.get(5).map(|t| t.ref_list().into()).unwrap_or_default();
                    pending.decomposition.push((parent, related));
                }
            }
            "IFCRELCONTAINEDINSPATIALSTRUCTURE" => {
                if let Some(parent) = attrs.get(5).and_then(Token::as_ref_id) {
                    let related: RefList = attrs.get(4).map(|t| t.ref_list().into()).unwrap_or_default();
                    pending.decomposition.push((parent, related));
                }
            }
            _ => {}
        }

        if !is_element_type(&type_name) {
            return;
        }
        let Some(guid) = attrs.first().and_then(Token::as_raw_str).filter(|g| is_ifc_guid(g)) else {
            return;
        };

        self.by_guid.insert(guid.to_string(), id);
        self.order.push(id);
        self.elements.insert(
            id,
            ElementRecord {
                id,
                ifc_type: type_name,
                guid: guid.to_string(),
                name: text_at(attrs, 2),
                description: text_at(attrs, 3),
                object_type: text_at(attrs, 4),
            },
        );
    }

    fn resolve(&mut self, pending: PendingRelations) {
        let PendingRelations {
            single_values,
            pset_members,
            defines,
            decomposition,
        } = pending;

        for (id, name, members) in pset_members {
            let properties = members
                .iter()
                .filter_map(|m| single_values.get(m).cloned())
                .collect();
            self.property_sets.insert(id, PropertySet { name, properties });
        }

        for (objects, pset) in defines {
            if !self.property_sets.contains_key(&pset) {
                continue;
            }
            for object in objects {
                if self.elements.contains_key(&object) {
                    self.element_psets.entry(object).or_default().push(pset);
                }
            }
        }

        for (parent, related) in decomposition {
            if !self.elements.contains_key(&parent) {
                continue;
            }
            for child in related {
                if self.elements.contains_key(&child) && !self.parents.contains_key(&child) {
                    self.parents.insert(child, parent);
                    self.children.entry(parent).or_default().push(child);
                }
            }
        }
    }

    /// Schema identifier from the header (`IFC2X3`, `IFC4`, ...).
    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    /// Number of rooted elements.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Elements in file order.
    pub fn iter(&self) -> impl Iterator<Item = &ElementRecord> {
        self.order.iter().filter_map(|id| self.elements.get(id))
    }

    pub fn get(&self, id: u32) -> Option<&ElementRecord> {
        self.elements.get(&id)
    }

    pub fn guid(&self, id: u32) -> Option<&str> {
        self.elements.get(&id).map(|e| e.guid.as_str())
    }

    pub fn id_for_guid(&self, guid: &str) -> Option<u32> {
        self.by_guid.get(guid).copied()
    }

    /// Translate ids to GlobalIds, preserving input order.
    ///
    /// Returns the GlobalIds found and the ids that are not in this index.
    pub fn guids(&self, ids: impl IntoIterator<Item = u32>) -> (Vec<String>, Vec<u32>) {
        let mut found = Vec::new();
        let mut missing = Vec::new();
        for id in ids {
            match self.guid(id) {
                Some(guid) => found.push(guid.to_string()),
                None => missing.push(id),
            }
        }
        (found, missing)
    }

    /// Property sets attached to an element.
    pub fn property_sets(&self, id: u32) -> Vec<&PropertySet> {
        self.element_psets
            .get(&id)
            .map(|ids| ids.iter().filter_map(|p| self.property_sets.get(p)).collect())
            .unwrap_or_default()
    }

    pub fn parent(&self, id: u32) -> Option<u32> {
        self.parents.get(&id).copied()
    }

    pub fn children(&self, id: u32) -> &[u32] {
        self.children.get(&id).map(|c| c.as_slice()).unwrap_or(&[])
    }

    /// Top of the spatial breakdown: the project, or failing that every
    /// parentless element that has children.
    pub fn spatial_roots(&self) -> Vec<u32> {
        let projects: Vec<u32> = self
            .iter()
            .filter(|e| e.ifc_type == "IFCPROJECT" && !self.parents.contains_key(&e.id))
            .map(|e| e.id)
            .collect();
        if !projects.is_empty() {
            return projects;
        }
        self.order
            .iter()
            .copied()
            .filter(|id| !self.parents.contains_key(id) && self.children.contains_key(id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODEL: &str = r#"ISO-10303-21;
HEADER;
FILE_DESCRIPTION(('ViewDefinition [CoordinationView]'),'2;1');
FILE_NAME('demo.ifc','2024-01-01T00:00:00',(''),(''),'','','');
FILE_SCHEMA(('IFC4'));
ENDSEC;
DATA;
#1=IFCPROJECT('0YvctVUKr0kugbFTf53O9L',$,'Demo',$,$,$,$,$,$);
#2=IFCSITE('2IlqBVTuv5fAFgP9pr6Rsx',$,'Site',$,$,$,$,$,.ELEMENT.,$,$,$,$,$);
#3=IFCBUILDING('3tUtfwxSTFLQ7W9tCZpWLz',$,'Building',$,$,$,$,$,.ELEMENT.,$,$,$);
#4=IFCBUILDINGSTOREY('0Qw3wFTuX5HRAkWcSXpOay',$,'Level 1',$,$,$,$,$,.ELEMENT.,0.);
#5=IFCWALL('2O2Fr$t4X7Zf8NOew3FLOH',$,'Wall',$,'Basic Wall',$,$,$,$);
#6=IFCDOOR('1hOSvn6df7F8_7GcBWlRGQ',$,'W\X2\00E4\X0\nde',$,$,$,$,$,$,$,$,$,$);
#10=IFCRELAGGREGATES('1zjUMeLGD4Bx3vUdSkz$iH',$,$,$,#1,(#2));
#11=IFCRELAGGREGATES('0mqh8$qWH0gfJiK6xSvYH_',$,$,$,#2,(#3));
#12=IFCRELAGGREGATES('3R$bU_ZZn0cAqfrO6I8PZN',$,$,$,#3,(#4));
#13=IFCRELCONTAINEDINSPATIALSTRUCTURE('2ZAvq$1kv6egT7ShZIbpnU',$,$,$,(#5,#6),#4);
#20=IFCPROPERTYSINGLEVALUE('IsExternal',$,IFCBOOLEAN(.T.),$);
#21=IFCPROPERTYSINGLEVALUE('FireRating',$,IFCLABEL('EI60'),$);
#22=IFCPROPERTYSET('1kNI8Tkwz3UewqH0Cv7Vab',$,'Pset_WallCommon',$,(#20,#21));
#23=IFCRELDEFINESBYPROPERTIES('0sLD0IGsv98fLBeT$LoI1a',$,$,$,(#5),#22);
ENDSEC;
END-ISO-10303-21;
"#;

    #[test]
    fn test_index_elements_and_guids() {
        let index = ElementIndex::parse(MODEL.as_bytes()).unwrap();
        assert_eq!(index.schema(), Some("IFC4"));
        assert_eq!(index.len(), 6);
        assert_eq!(index.guid(5), Some("2O2Fr$t4X7Zf8NOew3FLOH"));
        assert_eq!(index.id_for_guid("1hOSvn6df7F8_7GcBWlRGQ"), Some(6));

        let wall = index.get(5).unwrap();
        assert_eq!(wall.ifc_type, "IFCWALL");
        assert_eq!(wall.name.as_deref(), Some("Wall"));
        assert_eq!(wall.object_type.as_deref(), Some("Basic Wall"));
        assert_eq!(index.get(6).unwrap().name.as_deref(), Some("Wände"));

        // Relationship and property set entities are not elements.
        assert!(index.get(10).is_none());
        assert!(index.get(22).is_none());

        let (found, missing) = index.guids([6, 99, 5]);
        assert_eq!(found, vec!["1hOSvn6df7F8_7GcBWlRGQ", "2O2Fr$t4X7Zf8NOew3FLOH"]);
        assert_eq!(missing, vec![99]);
    }

    #[test]
    fn test_property_sets() {
        let index = ElementIndex::parse(MODEL.as_bytes()).unwrap();
        let psets = index.property_sets(5);
        assert_eq!(psets.len(), 1);
        assert_eq!(psets[0].name, "Pset_WallCommon");
        assert_eq!(
            psets[0].properties,
            vec![
                Property { name: "IsExternal".into(), value: Some("true".into()) },
                Property { name: "FireRating".into(), value: Some("EI60".into()) },
            ]
        );
        assert!(index.property_sets(6).is_empty());
    }

    #[test]
    fn test_spatial_tree() {
        let index = ElementIndex::parse(MODEL.as_bytes()).unwrap();
        assert_eq!(index.spatial_roots(), vec![1]);
        assert_eq!(index.children(1), &[2]);
        assert_eq!(index.children(4), &[5, 6]);
        assert_eq!(index.parent(5), Some(4));
        assert!(index.children(5).is_empty());
    }

    #[test]
    fn test_malformed_payloads() {
        assert_eq!(ElementIndex::parse(b"not a model").unwrap_err(), Error::MissingHeader);
        assert_eq!(ElementIndex::parse(&[0xff, 0xfe]).unwrap_err(), Error::InvalidUtf8(0));

        let broken = MODEL.replace("#21=IFCPROPERTYSINGLEVALUE('FireRating',$,IFCLABEL('EI60'),$);", "#21=IFCPROPERTYSINGLEVALUE('FireRating',$,IFCLABEL('EI60'),$));");
        assert!(matches!(ElementIndex::parse(broken.as_bytes()), Err(Error::Parse { .. })));

        let duplicated = MODEL.replace("#6=IFCDOOR", "#5=IFCDOOR");
        assert_eq!(ElementIndex::parse(duplicated.as_bytes()).unwrap_err(), Error::DuplicateEntity(5));
    }

    #[test]
    fn test_shared_property_value() {
        let shared = MODEL.replace(
            "#23=IFCRELDEFINESBYPROPERTIES",
            "#24=IFCPROPERTYSET('3kNI8Tkwz3UewqH0Cv7Vab',$,'Pset_DoorCommon',$,(#21));\n\
#25=IFCRELDEFINESBYPROPERTIES('2sLD0IGsv98fLBeT$LoI1a',$,$,$,(#6),#24);\n\
#23=IFCRELDEFINESBYPROPERTIES",
        );
        let index = ElementIndex::parse(shared.as_bytes()).unwrap();
        let wall = index.property_sets(5);
        let door = index.property_sets(6);
        assert_eq!(wall[0].properties.len(), 2);
        assert_eq!(door[0].name, "Pset_DoorCommon");
        assert_eq!(door[0].properties, vec![Property { name: "FireRating".into(), value: Some("EI60".into()) }]);
    }

    #[test]
    fn test_spatial_roots_without_project() {
        let file = "ISO-10303-21;\nHEADER;\nFILE_SCHEMA(('IFC2X3'));\nENDSEC;\nDATA;\n\
#2=IFCSITE('2IlqBVTuv5fAFgP9pr6Rsx',$,'Site',$,$,$,$,$,.ELEMENT.,$,$,$,$,$);\n\
#4=IFCBUILDINGSTOREY('0Qw3wFTuX5HRAkWcSXpOay',$,'Level 1',$,$,$,$,$,.ELEMENT.,0.);\n\
#5=IFCWALL('2O2Fr$t4X7Zf8NOew3FLOH',$,'Wall',$,$,$,$,$,$);\n\
#6=IFCSLAB('3cUkl32yn9qRSPvBJVyWw5',$,'Loose slab',$,$,$,$,$,$);\n\
#10=IFCRELAGGREGATES('1zjUMeLGD4Bx3vUdSkz$iH',$,$,$,#2,(#4));\n\
#13=IFCRELCONTAINEDINSPATIALSTRUCTURE('2ZAvq$1kv6egT7ShZIbpnU',$,$,$,(#5),#4);\n\
ENDSEC;\nEND-ISO-10303-21;\n";
        let index = ElementIndex::parse(file.as_bytes()).unwrap();
        // The site has no parent and carries the breakdown; the loose slab has no children.
        assert_eq!(index.spatial_roots(), vec![2]);
        assert_eq!(index.children(2), &[4]);
        assert_eq!(index.children(4), &[5]);
    }

    #[test]
    fn test_builder_steps_in_batches() {
        let mut builder = ElementIndexBuilder::new(MODEL.as_bytes()).unwrap();
        assert!(!builder.step(4).unwrap());
        assert_eq!(builder.scanned(), 4);
        let mut batches = 1;
        while !builder.step(4).unwrap() {
            batches += 1;
        }
        assert_eq!(builder.scanned(), 14);
        assert_eq!(batches, 3);

        let index = builder.finish().unwrap();
        assert_eq!(index.spatial_roots(), vec![1]);
        assert_eq!(index.property_sets(5).len(), 1);

        assert!(matches!(ElementIndexBuilder::new(b"not a model"), Err(Error::MissingHeader)));
    }

    #[test]
    fn test_guid_shape() {
        assert!(is_ifc_guid("2O2Fr$t4X7Zf8NOew3FLOH"));
        assert!(!is_ifc_guid("short"));
        assert!(!is_ifc_guid("2O2Fr$t4X7Zf8NOew3FLO-"));
    }
}
