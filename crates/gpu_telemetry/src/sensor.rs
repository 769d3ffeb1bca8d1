//! Slots de sensores publicados ao host e a política de valor antigo.

use std::fmt;

use crate::status::StatusCode;

/// Categoria de um sensor, como o host a registra.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorKind {
    Clock,
    Temperature,
    /// Nível em % (fan, TDP)
    Level,
    Power,
    /// Carga em % (engines, memória)
    Load,
    /// Quantidade de dados (MiB)
    SmallData,
}

impl SensorKind {
    pub fn unit(self) -> &'static str {
        match self {
            SensorKind::Clock => "MHz",
            SensorKind::Temperature => "°C",
            SensorKind::Level | SensorKind::Load => "%",
            SensorKind::Power => "W",
            SensorKind::SmallData => "MiB",
        }
    }
}

/// Valor lido com a sua grandeza.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    Frequency(f32),
    Temperature(f32),
    Percentage(f32),
    Power(f32),
    DataSize(f32),
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reading::Frequency(v) => write!(f, "{v:.0} MHz"),
            Reading::Temperature(v) => write!(f, "{v:.0} °C"),
            Reading::Percentage(v) => write!(f, "{v:.1} %"),
            Reading::Power(v) => write!(f, "{v:.1} W"),
            Reading::DataSize(v) => write!(f, "{v:.0} MiB"),
        }
    }
}

/// Descrição imutável de uma grandeza monitorada.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorSlot {
    pub name: &'static str,
    pub kind: SensorKind,
    pub index: u32,
}

impl SensorSlot {
    pub const fn new(name: &'static str, kind: SensorKind, index: u32) -> Self {
        Self { name, kind, index }
    }

    pub fn unit(&self) -> &'static str {
        self.kind.unit()
    }
}

/// Falha de uma consulta individual do ciclo de atualização.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("{0}")]
    Status(#[from] StatusCode),

    #[error("limite de potência padrão igual a zero")]
    ZeroPowerLimit,

    #[error("memória total igual a zero")]
    ZeroMemoryTotal,
}

/// Slot + último valor lido com sucesso.
#[derive(Debug, Clone, PartialEq)]
pub struct Sensor {
    slot: SensorSlot,
    value: Option<f32>,
}

impl Sensor {
    pub fn new(slot: SensorSlot) -> Self {
        Self { slot, value: None }
    }

    pub fn slot(&self) -> &SensorSlot {
        &self.slot
    }

    /// Último valor lido. `None` = nenhuma leitura teve sucesso ainda.
    pub fn value(&self) -> Option<f32> {
        self.value
    }

    pub fn reading(&self) -> Option<Reading> {
        let v = self.value?;
        Some(match self.slot.kind {
            SensorKind::Clock => Reading::Frequency(v),
            SensorKind::Temperature => Reading::Temperature(v),
            SensorKind::Level | SensorKind::Load => Reading::Percentage(v),
            SensorKind::Power => Reading::Power(v),
            SensorKind::SmallData => Reading::DataSize(v),
        })
    }

    /// Aplica o resultado de uma consulta. Em erro, o valor anterior fica.
    pub fn apply(&mut self, result: Result<f32, QueryError>) -> Result<(), QueryError> {
        self.value = Some(result?);
        Ok(())
    }

    pub(crate) fn set(&mut self, value: f32) {
        self.value = Some(value);
    }
}

/// Capacidade de registro oferecida pelo host.
///
/// Chamada uma vez por sensor na construção do adaptador.
pub trait SensorRegistry {
    fn activate(&mut self, hardware_id: &str, slot: &SensorSlot);
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMP: SensorSlot = SensorSlot::new("GPU Core", SensorKind::Temperature, 0);

    #[test]
    fn new_sensor_has_no_value() {
        let s = Sensor::new(TEMP);
        assert_eq!(s.value(), None);
        assert_eq!(s.reading(), None);
    }

    #[test]
    fn failed_apply_keeps_previous_value() {
        let mut s = Sensor::new(TEMP);
        s.apply(Ok(61.0)).unwrap();
        let err = s.apply(Err(StatusCode::Timeout.into()));
        assert_eq!(err, Err(QueryError::Status(StatusCode::Timeout)));
        assert_eq!(s.value(), Some(61.0));
    }

    #[test]
    fn reading_is_tagged_by_kind() {
        let mut s = Sensor::new(SensorSlot::new("GPU Memory Total", SensorKind::SmallData, 0));
        s.apply(Ok(7629.39)).unwrap();
        assert_eq!(s.reading(), Some(Reading::DataSize(7629.39)));
        assert_eq!(s.slot().unit(), "MiB");
        assert_eq!(Reading::Power(240.0).to_string(), "240.0 W");
    }
}
