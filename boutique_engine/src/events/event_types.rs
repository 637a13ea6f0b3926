use serde::{Deserialize, Serialize};

use crate::db_types::{OpenPackage, PackageOrder};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageOpenedEvent {
    pub package: OpenPackage,
}

impl PackageOpenedEvent {
    pub fn new(package: OpenPackage) -> Self {
        Self { package }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAddedEvent {
    pub package: OpenPackage,
    pub package_order: PackageOrder,
}

impl OrderAddedEvent {
    pub fn new(package: OpenPackage, package_order: PackageOrder) -> Self {
        Self { package, package_order }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageClosedEvent {
    pub package: OpenPackage,
}

impl PackageClosedEvent {
    pub fn new(package: OpenPackage) -> Self {
        Self { package }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageShippedEvent {
    pub package: OpenPackage,
}

impl PackageShippedEvent {
    pub fn new(package: OpenPackage) -> Self {
        Self { package }
    }
}

/// Fired once per package when it enters the closing-warning horizon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageClosingSoonEvent {
    pub package: OpenPackage,
}

impl PackageClosingSoonEvent {
    pub fn new(package: OpenPackage) -> Self {
        Self { package }
    }
}
