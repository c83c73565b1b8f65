use std::fmt;

/// Identifies a proxy-facing resource (or a section of one, like a Gateway
/// listener) that a policy may attach to.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ResourceId {
    pub group: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
    pub section_name: Option<String>,
}

/// Describes how a policy came to target a resource.
///
/// The ordering is significant: variants that compare lower take precedence
/// when several policies target the same resource.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum TargetMechanism {
    /// The resource is named by the deprecated singular `targetRef`.
    LegacyTargetRef,
    /// The resource is named in `targetRefs`.
    TargetRefs,
    /// The resource's labels are matched by one of `targetSelectors`.
    TargetSelector,
}

// === impl ResourceId ===

impl ResourceId {
    pub fn new(
        group: impl Into<String>,
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
            section_name: None,
        }
    }

    pub fn with_section_name(mut self, section_name: impl Into<String>) -> Self {
        self.section_name = Some(section_name.into());
        self
    }

    /// Returns the identity of the whole resource, dropping any section name.
    pub fn without_section(&self) -> Self {
        Self {
            section_name: None,
            ..self.clone()
        }
    }

    /// Returns the kind qualified by its group, if necessary.
    pub fn canonical_kind(&self) -> String {
        if self.group.is_empty() {
            self.kind.clone()
        } else {
            format!("{}.{}", self.kind, self.group)
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.canonical_kind(), self.namespace, self.name)?;
        if let Some(section) = self.section_name.as_deref() {
            write!(f, "#{section}")?;
        }
        Ok(())
    }
}

// === impl TargetMechanism ===

impl TargetMechanism {
    /// Direct references name a resource explicitly; selectors only match it.
    pub fn is_direct(&self) -> bool {
        matches!(self, Self::LegacyTargetRef | Self::TargetRefs)
    }

    /// The precedence tier of the mechanism. Lower tiers win.
    ///
    /// Both direct reference forms share a tier: a policy can only use one of
    /// them, so they never compete with each other for the same policy.
    pub fn tier(&self) -> u8 {
        if self.is_direct() {
            0
        } else {
            1
        }
    }
}

impl fmt::Display for TargetMechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LegacyTargetRef => f.write_str("targetRef"),
            Self::TargetRefs => f.write_str("targetRefs"),
            Self::TargetSelector => f.write_str("targetSelectors"),
        }
    }
}
