//! Relatório textual estático de identidade/topologia de uma GPU.
//!
//! Fora do loop de polling. Cada campo é opcional: consulta que falha omite a
//! linha, nunca o relatório inteiro.

use crate::adapter::GpuAdapter;
use crate::types::{DEVICE_PCI_BUS_ID_BUFFER_SIZE, TextField, bounded_text};

impl GpuAdapter {
    /// Dump multi-linha. Vazio para adaptador desativado ou biblioteca fechada.
    pub fn generate_report(&self) -> String {
        let Some(device) = self.device else {
            return String::new();
        };
        if !self.library.is_available() {
            return String::new();
        }
        let binding = self.library.binding();
        let text = |field: TextField| {
            binding
                .device_text(device, field)
                .map(|s| bounded_text(&s, field.capacity()))
        };

        let mut r: Vec<String> = vec!["Nvidia GPU".into(), String::new()];

        r.push(format!("Name: {}", self.name));
        if let Ok(index) = binding.device_index(device) {
            r.push(format!("Index: {index}"));
        }
        if let Ok(version) = self.library.driver_version() {
            r.push(format!("Driver Version: {version}"));
        }
        r.push(String::new());

        if let Ok(pci) = binding.pci_info(device) {
            let bus_id = bounded_text(&pci.bus_id, DEVICE_PCI_BUS_ID_BUFFER_SIZE);
            r.push(format!("PCIBus: {bus_id}"));
            r.push(format!("PCIBusId: 0x{:X}", pci.bus));
            r.push(format!("PCISubSystemID: 0x{:X}", pci.pci_sub_system_id));
            r.push(format!("DeviceID: 0x{:X}", pci.device_id()));
            r.push(format!("VendorID: 0x{:X}", pci.vendor_id()));
            r.push(String::new());
        }

        if let Ok(generation) = binding.pcie_link_generation(device) {
            r.push(format!("PCIE Generation: {generation}"));
        }
        if let Ok(width) = binding.pcie_link_width(device) {
            r.push(format!("PCIE Width: x{width}"));
        }
        r.push(String::new());

        if let Ok(uuid) = text(TextField::Uuid) {
            r.push(format!("Device UUID: {uuid}"));
        }
        if let Ok(vbios) = text(TextField::VbiosVersion) {
            r.push(format!("VBIOS Version: {vbios}"));
        }
        r.push(String::new());

        let mut report = r.join("\n");
        report.push('\n');
        report
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::adapter::GpuAdapter;
    use crate::fake::{Call, FakeBinding};
    use crate::library::{LibrarySearch, TelemetryLibrary};
    use crate::sensor::{SensorRegistry, SensorSlot};
    use crate::status::StatusCode;
    use crate::types::TextField;

    struct Ignore;

    impl SensorRegistry for Ignore {
        fn activate(&mut self, _: &str, _: &SensorSlot) {}
    }

    fn setup(devices: u32) -> (Arc<FakeBinding>, Arc<TelemetryLibrary>) {
        let fake = Arc::new(FakeBinding::with_devices(devices));
        let lib = Arc::new(TelemetryLibrary::new(fake.clone(), LibrarySearch::SystemDefault));
        (fake, lib)
    }

    #[test]
    fn full_report() {
        let (_, lib) = setup(1);
        let report = GpuAdapter::new(lib, 0, &mut Ignore).generate_report();

        assert!(report.starts_with("Nvidia GPU\n"));
        assert!(report.contains("Name: NVIDIA GeForce RTX 3080 #0\n"));
        assert!(report.contains("Index: 0\n"));
        assert!(report.contains("Driver Version: 535.54.03\n"));
        assert!(report.contains("PCIBus: 00000000:01:00.0\n"));
        assert!(report.contains("PCIBusId: 0x1\n"));
        assert!(report.contains("PCISubSystemID: 0x38951462\n"));
        assert!(report.contains("DeviceID: 0x2206\n"));
        assert!(report.contains("VendorID: 0x10DE\n"));
        assert!(report.contains("PCIE Generation: 4\n"));
        assert!(report.contains("PCIE Width: x16\n"));
        assert!(report.contains("Device UUID: GPU-00000000-1111-2222-3333-444444444444\n"));
        assert!(report.contains("VBIOS Version: 94.02.42.00.A9\n"));
    }

    #[test]
    fn failed_fields_are_omitted() {
        let (fake, lib) = setup(1);
        fake.fail(Call::PciInfo, StatusCode::NotSupported);
        fake.fail(Call::Text(TextField::VbiosVersion), StatusCode::Timeout);
        fake.fail(Call::DriverVersion, StatusCode::Unknown);

        let report = GpuAdapter::new(lib, 0, &mut Ignore).generate_report();

        assert!(!report.contains("PCIBus"));
        assert!(!report.contains("DeviceID"));
        assert!(!report.contains("VBIOS"));
        assert!(!report.contains("Driver Version"));
        assert!(report.contains("Device UUID: "));
        assert!(report.contains("PCIE Width: x16"));
    }

    #[test]
    fn second_device_missing_gives_empty_report() {
        let (fake, lib) = setup(2);
        // A binding anuncia 2 GPUs, mas o índice 1 não resolve
        fake.hide(1);
        let first = GpuAdapter::new(lib.clone(), 0, &mut Ignore);
        let mut second = GpuAdapter::new(lib, 1, &mut Ignore);
        second.update();

        let r0 = first.generate_report();
        assert!(r0.contains("Name: "));
        assert!(r0.contains("Device UUID: "));
        assert!(r0.contains("Driver Version: "));
        assert_eq!(second.generate_report(), "");
    }

    #[test]
    fn disabled_adapter_report_is_empty() {
        let (fake, lib) = setup(1);
        fake.fail(Call::Init, StatusCode::DriverNotLoaded);
        let gpu = GpuAdapter::new(lib, 0, &mut Ignore);
        assert_eq!(gpu.generate_report(), "");
    }
}
