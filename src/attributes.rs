//! Attribute declarations and the column layout they induce on a design matrix.

use std::collections::HashSet;

use nalgebra::DVector;
use serde::Serialize;

use crate::error::{DesignError, Result};

/// How the levels of an attribute enter the utility function.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Coding {
    /// The level value is used directly and carries a single parameter.
    Numeric,
    /// One binary contrast per non-baseline level; the first level is the baseline.
    Dummy,
}

/// A named prior weight.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Parameter {
    name: String,
    prior: f64,
}

impl Parameter {
    /// Creates a parameter from a name and prior value.
    pub fn new<S: Into<String>>(name: S, prior: f64) -> Self {
        Self {
            name: name.into(),
            prior,
        }
    }

    /// Symbolic name of the parameter.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Prior value used when scoring designs.
    pub fn prior(&self) -> f64 {
        self.prior
    }
}

/// An attribute shared by every (non opt-out) alternative.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Attribute {
    name: String,
    levels: Vec<f64>,
    coding: Coding,
    parameters: Vec<Parameter>,
}

impl Attribute {
    /// Numeric attribute with one prior.
    pub fn numeric<S: Into<String>>(name: S, levels: Vec<f64>, prior: f64) -> Self {
        let name = name.into();
        let parameters = vec![Parameter::new(format!("b_{name}"), prior)];
        Self {
            name,
            levels,
            coding: Coding::Numeric,
            parameters,
        }
    }

    /// Dummy-coded attribute with one prior per non-baseline level.
    pub fn dummy<S: Into<String>>(name: S, levels: Vec<f64>, priors: Vec<f64>) -> Self {
        let name = name.into();
        let parameters = priors
            .iter()
            .enumerate()
            .map(|(index, prior)| {
                let label = levels
                    .get(index + 1)
                    .map_or_else(|| (index + 1).to_string(), |level| level.to_string());
                Parameter::new(format!("b_{name}_{label}"), *prior)
            })
            .collect();
        Self {
            name,
            levels,
            coding: Coding::Dummy,
            parameters,
        }
    }

    /// Consecutive integer levels `0..count`.
    pub fn levels(count: usize) -> Vec<f64> {
        (0..count).map(|level| level as f64).collect()
    }

    /// Attribute name as referenced by conditions.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Permissible levels in declaration order.
    pub fn level_values(&self) -> &[f64] {
        &self.levels
    }

    /// Coding applied when building the information matrix.
    pub fn coding(&self) -> Coding {
        self.coding
    }

    /// Priors attached to this attribute.
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Number of coded columns this attribute contributes per alternative.
    pub fn coded_width(&self) -> usize {
        match self.coding {
            Coding::Numeric => 1,
            Coding::Dummy => self.levels.len().saturating_sub(1),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.levels.len() < 2 {
            return Err(DesignError::TooFewLevels {
                name: self.name.clone(),
                levels: self.levels.len(),
            });
        }
        let mut seen = Vec::with_capacity(self.levels.len());
        for level in &self.levels {
            if !level.is_finite() || seen.contains(level) {
                return Err(DesignError::InvalidLevel {
                    name: self.name.clone(),
                    level: *level,
                });
            }
            seen.push(*level);
        }
        let expected = self.coded_width();
        if self.parameters.len() != expected {
            return Err(DesignError::dimension_mismatch(
                "attribute priors",
                expected,
                self.parameters.len(),
            ));
        }
        if self.parameters.iter().any(|p| !p.prior().is_finite()) {
            return Err(DesignError::NumericalError {
                context: "attribute prior",
            });
        }
        Ok(())
    }
}

/// Alternative-specific constant attached to a 1-based alternative index.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Asc {
    alternative: usize,
    prior: f64,
}

impl Asc {
    /// Creates an ASC for `alternative` (1-based; the opt-out is `n_alts + 1`).
    pub fn new(alternative: usize, prior: f64) -> Self {
        Self { alternative, prior }
    }

    /// Alternative the constant belongs to.
    pub fn alternative(&self) -> usize {
        self.alternative
    }

    /// Prior value of the constant.
    pub fn prior(&self) -> f64 {
        self.prior
    }
}

/// What a design column holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnKind {
    /// Indicator for the ASC at position `index` in the layout's ASC list.
    Asc { index: usize },
    /// Levels of the attribute at position `attribute`.
    Attribute { attribute: usize },
}

/// Metadata for one column of the design matrix.
#[derive(Clone, Debug)]
pub struct DesignColumn {
    name: String,
    alternative: usize,
    kind: ColumnKind,
    levels: Vec<f64>,
    coding: Coding,
    offset: usize,
}

impl DesignColumn {
    /// Column name, e.g. `alt1_price`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Zero-based alternative the column belongs to.
    pub fn alternative(&self) -> usize {
        self.alternative
    }

    /// Whether the column stores an ASC indicator or attribute levels.
    pub fn kind(&self) -> ColumnKind {
        self.kind
    }

    /// Values the column may take.
    pub fn levels(&self) -> &[f64] {
        &self.levels
    }

    /// Coding of the underlying attribute (ASC columns are numeric).
    pub fn coding(&self) -> Coding {
        self.coding
    }

    /// First parameter index this column feeds.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// True for ASC columns, whose single level never changes.
    pub fn is_fixed(&self) -> bool {
        matches!(self.kind, ColumnKind::Asc { .. })
    }
}

/// Column and parameter structure shared by all candidate designs of a session.
#[derive(Clone, Debug)]
pub struct DesignLayout {
    attributes: Vec<Attribute>,
    ascs: Vec<Asc>,
    alternatives: usize,
    optout: bool,
    columns: Vec<DesignColumn>,
    parameter_names: Vec<String>,
    priors: DVector<f64>,
}

impl DesignLayout {
    /// Creates a layout without opt-out or ASCs.
    pub fn new(attributes: Vec<Attribute>, alternatives: usize) -> Result<Self> {
        DesignLayoutBuilder::new(attributes, alternatives).build()
    }

    /// Number of alternatives excluding the opt-out.
    pub fn alternatives(&self) -> usize {
        self.alternatives
    }

    /// Number of alternatives including the opt-out.
    pub fn total_alternatives(&self) -> usize {
        self.alternatives + usize::from(self.optout)
    }

    /// Whether a no-choice alternative is appended last.
    pub fn has_optout(&self) -> bool {
        self.optout
    }

    /// Declared attributes.
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Declared ASCs, ordered by alternative.
    pub fn ascs(&self) -> &[Asc] {
        &self.ascs
    }

    /// Number of ASC parameters, which lead the parameter vector.
    pub fn asc_count(&self) -> usize {
        self.ascs.len()
    }

    /// Column metadata in design-matrix order.
    pub fn columns(&self) -> &[DesignColumn] {
        &self.columns
    }

    /// Number of design-matrix columns.
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Column names in design-matrix order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Level sets in design-matrix order.
    pub fn column_levels(&self) -> Vec<Vec<f64>> {
        self.columns.iter().map(|c| c.levels.clone()).collect()
    }

    /// Length of the parameter vector.
    pub fn parameter_count(&self) -> usize {
        self.priors.len()
    }

    /// Parameter names, ASCs first.
    pub fn parameter_names(&self) -> &[String] {
        &self.parameter_names
    }

    /// Prior vector, ASCs first.
    pub fn priors(&self) -> &DVector<f64> {
        &self.priors
    }
}

/// Builder that validates attributes, alternatives and ASCs before constructing a [`DesignLayout`].
#[derive(Debug)]
pub struct DesignLayoutBuilder {
    attributes: Vec<Attribute>,
    alternatives: usize,
    optout: bool,
    ascs: Vec<Asc>,
}

impl DesignLayoutBuilder {
    /// Start building a layout from shared attributes and the number of alternatives.
    pub fn new(attributes: Vec<Attribute>, alternatives: usize) -> Self {
        Self {
            attributes,
            alternatives,
            optout: false,
            ascs: Vec::new(),
        }
    }

    /// Appends a no-choice alternative after the designed alternatives.
    pub fn optout(mut self, optout: bool) -> Self {
        self.optout = optout;
        self
    }

    /// Adds an alternative-specific constant.
    pub fn asc(mut self, asc: Asc) -> Self {
        self.ascs.push(asc);
        self
    }

    /// Finalizes construction after validating names, levels and priors.
    pub fn build(mut self) -> Result<DesignLayout> {
        if self.alternatives == 0 {
            return Err(DesignError::dimension_mismatch("alternatives", 1, 0));
        }
        if self.attributes.is_empty() {
            return Err(DesignError::dimension_mismatch("attributes", 1, 0));
        }

        let mut names = HashSet::new();
        for attribute in &self.attributes {
            if !names.insert(attribute.name().to_string()) {
                return Err(DesignError::DuplicateAttribute {
                    name: attribute.name().to_string(),
                });
            }
            attribute.validate()?;
        }

        let total = self.alternatives + usize::from(self.optout);
        self.ascs.sort_by_key(Asc::alternative);
        for (index, asc) in self.ascs.iter().enumerate() {
            let duplicate = index > 0 && self.ascs[index - 1].alternative == asc.alternative;
            if asc.alternative == 0 || asc.alternative > total || duplicate {
                return Err(DesignError::InvalidAlternative {
                    alternative: asc.alternative,
                    available: total,
                });
            }
            if !asc.prior.is_finite() {
                return Err(DesignError::NumericalError {
                    context: "ASC prior",
                });
            }
        }

        let mut parameter_names = Vec::new();
        let mut priors = Vec::new();
        for asc in &self.ascs {
            parameter_names.push(format!("asc{}", asc.alternative));
            priors.push(asc.prior);
        }
        for parameter in self.attributes.iter().flat_map(Attribute::parameters) {
            parameter_names.push(parameter.name().to_string());
            priors.push(parameter.prior());
        }

        let mut columns = Vec::new();
        for alternative in 0..total {
            let label = if alternative < self.alternatives {
                format!("alt{}", alternative + 1)
            } else {
                "optout".to_string()
            };
            for (index, asc) in self.ascs.iter().enumerate() {
                let own = asc.alternative == alternative + 1;
                columns.push(DesignColumn {
                    name: format!("{label}_asc{}", asc.alternative),
                    alternative,
                    kind: ColumnKind::Asc { index },
                    levels: vec![if own { 1.0 } else { 0.0 }],
                    coding: Coding::Numeric,
                    offset: index,
                });
            }
            if alternative >= self.alternatives {
                continue;
            }
            let mut offset = self.ascs.len();
            for (index, attribute) in self.attributes.iter().enumerate() {
                columns.push(DesignColumn {
                    name: format!("{label}_{}", attribute.name()),
                    alternative,
                    kind: ColumnKind::Attribute { attribute: index },
                    levels: attribute.level_values().to_vec(),
                    coding: attribute.coding(),
                    offset,
                });
                offset += attribute.coded_width();
            }
        }

        Ok(DesignLayout {
            attributes: self.attributes,
            ascs: self.ascs,
            alternatives: self.alternatives,
            optout: self.optout,
            columns,
            parameter_names,
            priors: DVector::from_vec(priors),
        })
    }
}
