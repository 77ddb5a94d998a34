use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Permission;

/// Role identifier used for RBAC.
///
/// The backend assigns exactly one role per user, drawn from a fixed set.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Administrador,
    Contador,
    Vendedor,
    Supervisor,
    Cliente,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Administrador,
        Role::Contador,
        Role::Vendedor,
        Role::Supervisor,
        Role::Cliente,
    ];

    /// Roles that operate the business (everyone except end customers).
    pub const OPERATIONAL: [Role; 4] = [
        Role::Administrador,
        Role::Contador,
        Role::Vendedor,
        Role::Supervisor,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Administrador => "administrador",
            Role::Contador => "contador",
            Role::Vendedor => "vendedor",
            Role::Supervisor => "supervisor",
            Role::Cliente => "cliente",
        }
    }

    /// Display label for UI surfaces.
    pub fn label(&self) -> &'static str {
        match self {
            Role::Administrador => "Administrador",
            Role::Contador => "Contador",
            Role::Vendedor => "Vendedor",
            Role::Supervisor => "Supervisor",
            Role::Cliente => "Cliente",
        }
    }

    /// The privileged role passes every permission check.
    pub fn is_privileged(&self) -> bool {
        matches!(self, Role::Administrador)
    }

    /// Default permission grants for the role, as configured on the backend.
    pub fn default_permissions(&self) -> Vec<Permission> {
        let codes: &[&'static str] = match self {
            Role::Administrador => &["*"],
            Role::Contador => &[
                "core.view_empresa",
                "core.view_sucursal",
                "core.view_cliente",
                "facturacion.*",
                "inventario.view_*",
                "contabilidad.*",
                "reportes.*",
            ],
            Role::Vendedor => &[
                "core.view_cliente",
                "core.add_cliente",
                "facturacion.view_factura",
                "facturacion.add_factura",
                "punto_venta.*",
            ],
            Role::Supervisor => &[
                "core.view_*",
                "usuarios.view_usuario",
                "facturacion.*",
                "inventario.view_*",
                "punto_venta.*",
                "reportes.view_reporte",
            ],
            Role::Cliente => &["facturacion.view_own_factura", "reportes.view_own_reporte"],
        };

        codes.iter().map(|c| Permission::new(*c)).collect()
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role '{0}'")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| UnknownRole(s.to_string()))
    }
}
