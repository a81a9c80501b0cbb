use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Numerical weapon parameters, most important first
pub const NUMERICAL_PARAMS: [&str; 14] = [
    "damages_first",
    "damages_last",
    "distances_last",
    "rof",
    "magsize",
    "reloadempty",
    "shotspershell",
    "hiprecoilright",
    "hiprecoilup",
    "distances_first",
    "initialspeed",
    "hiprecoildec",
    "hipstandbasespreaddec",
    "hipstandbasespreadinc",
];

pub const CATEGORICAL_PARAMS: [&str; 2] = ["type", "firemode"];
pub const WEAPON_TYPES: [&str; 6] = ["Shotgun", "Pistol", "Rifle", "SMG", "Sniper", "MG"];
pub const WEAPON_FIREMODES: [&str; 3] = ["Automatic", "Semi", "Single"];

pub const AMMO_FIELD: &str = "ammo";
pub const NUM_AMMO_TYPES: usize = 31;
pub const DEFAULT_AMMO_DIM: usize = 1;
pub const DEFAULT_SEED: u64 = 19071991;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoricalField {
    pub name: Box<str>,
    pub vocabulary: Vec<Box<str>>,
}

impl CategoricalField {
    pub fn new(name: &str, vocabulary: &[&str]) -> Self {
        Self {
            name: name.into(),
            vocabulary: vocabulary.iter().map(|&v| v.into()).collect(),
        }
    }

    /// `<field>_<label>`
    pub fn label_key(&self, label: &str) -> String {
        format!("{}_{}", self.name, label)
    }
}

/// A categorical field that is hashed into `num_buckets` rows of a
/// fixed random embedding table of width `dim`. It is only ever
/// encoded, never decoded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddedField {
    pub name: Box<str>,
    pub num_buckets: usize,
    pub dim: usize,
    pub seed: u64,
}

/// Which fields go into the encoded matrix, and in what order
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    numeric: Vec<Box<str>>,
    categorical: Vec<CategoricalField>,
    embedded: Option<EmbeddedField>,
}

impl Schema {
    /// * `numeric` - one column each, in this order
    /// * `categorical` - one-hot blocks after the numeric columns
    /// * `embedded` - optional hashed block at the very end
    pub fn new(
        numeric: Vec<Box<str>>,
        categorical: Vec<CategoricalField>,
        embedded: Option<EmbeddedField>,
    ) -> anyhow::Result<Self> {
        let mut seen = HashSet::new();
        let names = numeric
            .iter()
            .chain(categorical.iter().map(|c| &c.name))
            .chain(embedded.iter().map(|e| &e.name));
        for name in names {
            if !seen.insert(name.clone()) {
                anyhow::bail!("field `{}` declared twice", name);
            }
        }

        for field in categorical.iter() {
            if field.vocabulary.is_empty() {
                anyhow::bail!("categorical field `{}` has no labels", field.name);
            }
        }

        if let Some(e) = &embedded {
            if e.num_buckets == 0 || e.dim == 0 {
                anyhow::bail!("embedded field `{}` needs buckets and width", e.name);
            }
        }

        Ok(Self {
            numeric,
            categorical,
            embedded,
        })
    }

    pub fn numeric(&self) -> &[Box<str>] {
        &self.numeric
    }

    pub fn categorical(&self) -> &[CategoricalField] {
        &self.categorical
    }

    pub fn embedded(&self) -> Option<&EmbeddedField> {
        self.embedded.as_ref()
    }

    /// Total number of encoded columns
    pub fn width(&self) -> usize {
        self.numeric.len()
            + self
                .categorical
                .iter()
                .map(|c| c.vocabulary.len())
                .sum::<usize>()
            + self.embedded.as_ref().map_or(0, |e| e.dim)
    }

    /// Every field a complete record must carry
    pub fn field_names(&self) -> Vec<&str> {
        self.numeric
            .iter()
            .map(|x| &**x)
            .chain(self.categorical.iter().map(|c| &*c.name))
            .chain(self.embedded.iter().map(|e| &*e.name))
            .collect()
    }

    pub fn column_map(&self) -> ColumnMap {
        let mut columns = Vec::with_capacity(self.width());
        for field in self.numeric.iter() {
            columns.push(Column::Numeric {
                field: field.clone(),
            });
        }
        for field in self.categorical.iter() {
            for label in field.vocabulary.iter() {
                columns.push(Column::Categorical {
                    field: field.name.clone(),
                    label: label.clone(),
                });
            }
        }
        if let Some(e) = &self.embedded {
            for index in 0..e.dim {
                columns.push(Column::Embedded {
                    field: e.name.clone(),
                    index,
                });
            }
        }
        ColumnMap { columns }
    }
}

/// What a single encoded column stands for
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Column {
    Numeric { field: Box<str> },
    Categorical { field: Box<str>, label: Box<str> },
    Embedded { field: Box<str>, index: usize },
}

impl Column {
    pub fn field(&self) -> &str {
        match self {
            Column::Numeric { field } => field,
            Column::Categorical { field, .. } => field,
            Column::Embedded { field, .. } => field,
        }
    }

    pub fn name(&self) -> Box<str> {
        match self {
            Column::Numeric { field } => field.clone(),
            Column::Categorical { field, label } => format!("{}_{}", field, label).into(),
            Column::Embedded { field, index } => format!("{}_{}", field, index).into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnMap {
    columns: Vec<Column>,
}

impl ColumnMap {
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn names(&self) -> Vec<Box<str>> {
        self.columns.iter().map(|c| c.name()).collect()
    }
}

/// The weapon schema used by the generator
///
/// * `num_categorical` - how many of `type`, `firemode` to use;
///   anything above two also turns on the hashed `ammo` block
/// * `num_numerical` - how many numerical parameters, by priority
/// * `embedded_dim` - width of the `ammo` block (0 means 1)
pub fn weapon_schema(
    num_categorical: usize,
    num_numerical: usize,
    embedded_dim: usize,
    seed: u64,
) -> anyhow::Result<Schema> {
    let include_ammo = num_categorical > CATEGORICAL_PARAMS.len();
    let num_categorical = num_categorical.min(CATEGORICAL_PARAMS.len());
    let num_numerical = num_numerical.min(NUMERICAL_PARAMS.len());

    let numeric = NUMERICAL_PARAMS[..num_numerical]
        .iter()
        .map(|&x| x.into())
        .collect();

    let categorical = CATEGORICAL_PARAMS[..num_categorical]
        .iter()
        .map(|&name| match name {
            "type" => CategoricalField::new(name, &WEAPON_TYPES),
            _ => CategoricalField::new(name, &WEAPON_FIREMODES),
        })
        .collect();

    let embedded = include_ammo.then(|| EmbeddedField {
        name: AMMO_FIELD.into(),
        num_buckets: NUM_AMMO_TYPES,
        dim: embedded_dim.max(1),
        seed,
    });

    Schema::new(numeric, categorical, embedded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weapon_schema_widths() -> anyhow::Result<()> {
        let schema = weapon_schema(2, 5, 1, DEFAULT_SEED)?;
        assert_eq!(schema.width(), 5 + 6 + 3);
        assert!(schema.embedded().is_none());

        let schema = weapon_schema(3, 100, 0, DEFAULT_SEED)?;
        assert_eq!(schema.width(), 14 + 6 + 3 + 1);
        assert_eq!(schema.field_names().last(), Some(&"ammo"));

        let names = weapon_schema(1, 2, 4, DEFAULT_SEED)?.column_map().names();
        assert_eq!(names.len(), 2 + 6);
        assert_eq!(&*names[1], "damages_last");
        assert_eq!(&*names[2], "type_Shotgun");
        Ok(())
    }

    #[test]
    fn duplicate_fields_are_rejected() {
        let schema = Schema::new(vec!["a".into(), "a".into()], vec![], None);
        assert!(schema.is_err());
    }
}
