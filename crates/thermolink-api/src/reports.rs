// Reporting endpoints: energy metrics and fault history.

use crate::error::Error;
use crate::models::{EnergyReportData, EnergyReportRequest, ErrorLogEntry, ErrorLogRequest};
use crate::session::{SessionManager, paths};

impl SessionManager {
    /// Fetch date-ranged energy metrics for one device.
    pub async fn energy_report(
        &self,
        request: &EnergyReportRequest,
    ) -> Result<EnergyReportData, Error> {
        self.post(paths::ENERGY_REPORT, request).await
    }

    /// Fetch the fault history for a set of devices.
    pub async fn error_log(&self, request: &ErrorLogRequest) -> Result<Vec<ErrorLogEntry>, Error> {
        self.post(paths::ERROR_LOG, request).await
    }
}
