//! rxsearch core types: drug records, the presentation projection and the
//! per-partition query expression.

#![forbid(unsafe_code)]

use std::cmp::Ordering;

use serde::{Deserialize, Deserializer, Serialize};
use smallvec::{smallvec, SmallVec};

pub mod score;

pub use score::{PatternError, Scorer, SynonymRule};

pub type DrugbankIds = SmallVec<[DrugbankId; 2]>;

/// External DrugBank identifier. Input accepts either a bare string or
/// `{ "id": "...", "primary": true }`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DrugbankId {
    pub id: String,
    #[serde(default)]
    pub primary: bool,
}

impl<'de> Deserialize<'de> for DrugbankId {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Plain(String),
            Full {
                id: String,
                #[serde(default)]
                primary: bool,
            },
        }
        Ok(match Repr::deserialize(d)? {
            Repr::Plain(id) => DrugbankId { id, primary: false },
            Repr::Full { id, primary } => DrugbankId { id, primary },
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct Synonym {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl<'de> Deserialize<'de> for Synonym {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Plain(String),
            Full {
                #[serde(default)]
                name: Option<String>,
                #[serde(default)]
                language: Option<String>,
            },
        }
        // null entries decode to a nameless synonym, which matching ignores
        Ok(match Option::<Repr>::deserialize(d)? {
            None => Synonym::default(),
            Some(Repr::Plain(name)) => Synonym { name: Some(name), language: None },
            Some(Repr::Full { name, language }) => Synonym { name, language },
        })
    }
}

/// A searchable drug. Every field except `name` may be absent; absent
/// collections behave like empty ones.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DrugRecord {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synonyms: Option<Vec<Synonym>>,
    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Option::is_none")]
    pub drugbank_id: Option<DrugbankIds>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub drug_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unii: Option<String>,
}

fn null_as_empty<'de, D>(d: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(d)?.unwrap_or_default())
}

fn one_or_many<'de, D>(d: D) -> Result<Option<DrugbankIds>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        Many(Vec<DrugbankId>),
        One(DrugbankId),
    }
    Ok(match Option::<OneOrMany>::deserialize(d)? {
        None => None,
        Some(OneOrMany::Many(v)) => Some(v.into_iter().collect()),
        Some(OneOrMany::One(id)) => Some(smallvec![id]),
    })
}

impl DrugRecord {
    /// Non-empty synonym names.
    pub fn synonym_names(&self) -> impl Iterator<Item = &str> {
        self.synonyms
            .iter()
            .flatten()
            .filter_map(|s| s.name.as_deref())
            .filter(|s| !s.is_empty())
    }

    fn ids(&self) -> impl Iterator<Item = &DrugbankId> {
        self.drugbank_id.iter().flatten().filter(|d| !d.id.trim().is_empty())
    }

    /// The identifier flagged primary, else the first one.
    pub fn primary_id(&self) -> Option<&str> {
        self.ids()
            .find(|d| d.primary)
            .or_else(|| self.ids().next())
            .map(|d| d.id.trim())
    }

    /// Borrowed dedup key: tag (0 = drugbank id, 1 = UNII) and trimmed value.
    fn key_parts(&self) -> Option<(u8, &str)> {
        if let Some(id) = self.primary_id() {
            return Some((0, id));
        }
        self.unii.as_deref().map(str::trim).filter(|u| !u.is_empty()).map(|u| (1, u))
    }

    /// Orders records by dedup key like comparing [`DrugRecord::dedup_key`]
    /// values, without allocating. Keyless records sort first.
    pub fn cmp_dedup_key(&self, other: &DrugRecord) -> Ordering {
        match (self.key_parts(), other.key_parts()) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some((ta, a)), Some((tb, b))) => ta.cmp(&tb).then_with(|| {
                a.bytes()
                    .map(|c| c.to_ascii_uppercase())
                    .cmp(b.bytes().map(|c| c.to_ascii_uppercase()))
            }),
        }
    }

    /// Key used to collapse copies of the same drug held by different
    /// partitions: primary drugbank id, else UNII. Compared ASCII
    /// case-insensitively. `None` means the record is never collapsed.
    pub fn dedup_key(&self) -> Option<String> {
        self.key_parts().map(|(tag, v)| match tag {
            0 => v.to_ascii_uppercase(),
            _ => format!("unii:{}", v.to_ascii_uppercase()),
        })
    }
}

/// What callers see for a matched drug. Never carries a relevance score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DrugSummary {
    pub name: String,
    /// All identifiers, primary first.
    pub drugbank_id: Vec<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub drug_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unii: Option<String>,
}

impl From<&DrugRecord> for DrugSummary {
    fn from(r: &DrugRecord) -> Self {
        let primary = r.primary_id();
        let mut ids: Vec<String> = Vec::new();
        if let Some(p) = primary {
            ids.push(p.to_string());
        }
        for d in r.ids() {
            let id = d.id.trim();
            if Some(id) != primary {
                ids.push(id.to_string());
            }
        }
        Self {
            name: r.name.clone(),
            drugbank_id: ids,
            drug_type: r.drug_type.clone(),
            unii: r.unii.clone(),
        }
    }
}

/// A record annotated with its relevance score. Lives only inside the
/// ranking stage; `into_summary` is the only way out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedDrug {
    pub record: DrugRecord,
    pub score: u32,
}

impl RankedDrug {
    pub fn into_summary(self) -> DrugSummary {
        DrugSummary::from(&self.record)
    }
}

/// Ranking order: score desc, then name asc, then dedup key asc.
pub fn rank_order(a: &RankedDrug, b: &RankedDrug) -> Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| a.record.name.cmp(&b.record.name))
        .then_with(|| a.record.cmp_dedup_key(&b.record))
}

/// The single filter+score+sort expression sent to every partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionQuery {
    /// Escaped, literal-safe pattern.
    pub pattern: String,
    pub skip: usize,
    pub limit: usize,
    pub synonym_rule: SynonymRule,
}

pub mod prelude {
    pub use super::{
        rank_order, DrugRecord, DrugSummary, DrugbankId, PartitionQuery, RankedDrug, Scorer,
        Synonym, SynonymRule,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_sparse_and_mixed_shapes() {
        let r: DrugRecord = serde_json::from_value(serde_json::json!({
            "name": "Aspirin",
            "synonyms": ["ASA", {"name": "Acetylsalicylic acid", "language": "english"}, {}],
            "drugbank_id": [{"id": "DB00945", "primary": true}, "APRD00264"],
            "type": "small molecule",
        }))
        .unwrap();
        assert_eq!(r.synonym_names().collect::<Vec<_>>(), vec!["ASA", "Acetylsalicylic acid"]);
        assert_eq!(r.primary_id(), Some("DB00945"));
        assert_eq!(r.unii, None);

        let single: DrugRecord = serde_json::from_value(serde_json::json!({
            "name": "X", "drugbank_id": "DB1"
        }))
        .unwrap();
        assert_eq!(single.primary_id(), Some("DB1"));

        let empty: DrugRecord = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(empty.name, "");
        assert_eq!(empty.synonym_names().count(), 0);
        assert_eq!(empty.dedup_key(), None);
    }

    #[test]
    fn dedup_key_prefers_primary_then_unii() {
        let mut r = DrugRecord {
            name: "a".into(),
            drugbank_id: Some(smallvec![
                DrugbankId { id: "db2".into(), primary: false },
                DrugbankId { id: "db1".into(), primary: true },
            ]),
            unii: Some("R16CO5Y76E".into()),
            ..Default::default()
        };
        assert_eq!(r.dedup_key().as_deref(), Some("DB1"));
        r.drugbank_id = None;
        assert_eq!(r.dedup_key().as_deref(), Some("unii:R16CO5Y76E"));
    }

    #[test]
    fn summary_lists_primary_first_without_score() {
        let r = DrugRecord {
            name: "Aspirin".into(),
            drugbank_id: Some(smallvec![
                DrugbankId { id: "APRD00264".into(), primary: false },
                DrugbankId { id: "DB00945".into(), primary: true },
            ]),
            drug_type: Some("small molecule".into()),
            ..Default::default()
        };
        let s = RankedDrug { record: r, score: 100 }.into_summary();
        assert_eq!(s.drugbank_id, vec!["DB00945", "APRD00264"]);
        let v = serde_json::to_value(&s).unwrap();
        assert!(v.get("score").is_none());
        assert_eq!(v["type"], "small molecule");
    }

    #[test]
    fn null_name_and_null_synonyms_are_tolerated() {
        let r: DrugRecord = serde_json::from_value(serde_json::json!({
            "name": null, "drugbank_id": "DB1"
        }))
        .unwrap();
        assert_eq!(r.name, "");
        assert_eq!(r.dedup_key().as_deref(), Some("DB1"));

        let r: DrugRecord = serde_json::from_value(serde_json::json!({
            "name": "A", "synonyms": [null, "ASA", null]
        }))
        .unwrap();
        assert_eq!(r.synonym_names().collect::<Vec<_>>(), vec!["ASA"]);
    }

    #[test]
    fn rank_order_ties_fall_back_to_case_insensitive_key() {
        let mk = |id: &str| RankedDrug {
            record: DrugRecord {
                name: "same".into(),
                drugbank_id: Some(smallvec![DrugbankId { id: id.into(), primary: true }]),
                ..Default::default()
            },
            score: 60,
        };
        let keyless = RankedDrug { record: DrugRecord { name: "same".into(), ..Default::default() }, score: 60 };
        let mut v = vec![mk("db2"), mk("DB1"), keyless];
        v.sort_by(rank_order);
        let keys: Vec<_> = v.iter().map(|r| r.record.dedup_key()).collect();
        assert_eq!(keys, vec![None, Some("DB1".to_string()), Some("DB2".to_string())]);
        assert_eq!(mk("db1").record.cmp_dedup_key(&mk("DB1").record), Ordering::Equal);
    }

    #[test]
    fn rank_order_breaks_ties_by_name() {
        let a = RankedDrug { record: DrugRecord { name: "b".into(), ..Default::default() }, score: 60 };
        let b = RankedDrug { record: DrugRecord { name: "a".into(), ..Default::default() }, score: 60 };
        let c = RankedDrug { record: DrugRecord { name: "z".into(), ..Default::default() }, score: 80 };
        let mut v = vec![a, b, c];
        v.sort_by(rank_order);
        let names: Vec<_> = v.iter().map(|r| r.record.name.as_str()).collect();
        assert_eq!(names, vec!["z", "a", "b"]);
    }
}
